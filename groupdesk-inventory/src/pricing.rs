use groupdesk_core::seat_bucket::round_money;
use groupdesk_core::{CoreError, CoreResult, PaxType, SeatBucket};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Price of `quantity` seats from one bucket. Amounts are two-decimal
/// fixed point in the bucket's currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareQuote {
    pub flight_group_id: Uuid,
    pub pax_type: PaxType,
    pub quantity: i32,
    pub currency: String,
    pub base_fare: Decimal,
    pub tax_amount: Decimal,
    pub fee_amount: Decimal,
    /// base + tax + fee for one seat
    pub unit_total: Decimal,
    pub total: Decimal,
    pub seats_available: i32,
}

pub fn quote(bucket: &SeatBucket, quantity: i32) -> CoreResult<FareQuote> {
    if quantity <= 0 {
        return Err(CoreError::ValidationError(
            "quantity must be greater than zero".to_string(),
        ));
    }

    let unit_total = round_money(bucket.base_fare + bucket.tax_amount + bucket.fee_amount);
    let total = unit_total
        .checked_mul(Decimal::from(quantity))
        .map(round_money)
        .ok_or_else(|| CoreError::ValidationError("quote total overflows".to_string()))?;

    Ok(FareQuote {
        flight_group_id: bucket.flight_group_id,
        pax_type: bucket.pax_type,
        quantity,
        currency: bucket.currency.clone(),
        base_fare: bucket.base_fare,
        tax_amount: bucket.tax_amount,
        fee_amount: bucket.fee_amount,
        unit_total,
        total,
        seats_available: bucket.available(),
    })
}
