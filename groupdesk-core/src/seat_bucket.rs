use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Passenger category. Each has its own capacity and pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PaxType {
    #[serde(rename = "ADT")]
    Adult,
    #[serde(rename = "CHD")]
    Child,
    #[serde(rename = "INF")]
    Infant,
}

impl PaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaxType::Adult => "ADT",
            PaxType::Child => "CHD",
            PaxType::Infant => "INF",
        }
    }
}

impl fmt::Display for PaxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaxType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADT" => Ok(PaxType::Adult),
            "CHD" => Ok(PaxType::Child),
            "INF" => Ok(PaxType::Infant),
            other => Err(CoreError::ValidationError(format!("Unknown pax type: {}", other))),
        }
    }
}

/// Capacity and pricing for one bucket, as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub total_seats: i32,
    pub base_fare: Decimal,
    pub tax_amount: Decimal,
    pub fee_amount: Decimal,
    pub currency: String,
}

impl BucketSpec {
    pub fn validate(&self) -> CoreResult<()> {
        if self.total_seats < 0 {
            return Err(CoreError::ValidationError(
                "total_seats must not be negative".to_string(),
            ));
        }
        validate_amount("base_fare", self.base_fare)?;
        validate_amount("tax_amount", self.tax_amount)?;
        validate_amount("fee_amount", self.fee_amount)?;
        validate_currency(&self.currency)?;
        Ok(())
    }
}

/// Seat inventory for one (flight group, pax type).
///
/// Invariant: `0 <= seats_on_hold`, `0 <= seats_issued` and
/// `seats_on_hold + seats_issued <= total_seats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatBucket {
    pub id: Uuid,
    pub flight_group_id: Uuid,
    pub pax_type: PaxType,
    pub total_seats: i32,
    pub seats_on_hold: i32,
    pub seats_issued: i32,
    pub base_fare: Decimal,
    pub tax_amount: Decimal,
    pub fee_amount: Decimal,
    pub currency: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SeatBucket {
    pub fn new(flight_group_id: Uuid, pax_type: PaxType, spec: &BucketSpec) -> CoreResult<Self> {
        spec.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            flight_group_id,
            pax_type,
            total_seats: spec.total_seats,
            seats_on_hold: 0,
            seats_issued: 0,
            base_fare: round_money(spec.base_fare),
            tax_amount: round_money(spec.tax_amount),
            fee_amount: round_money(spec.fee_amount),
            currency: spec.currency.to_ascii_uppercase(),
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Seats held or issued.
    pub fn committed(&self) -> i32 {
        self.seats_on_hold + self.seats_issued
    }

    pub fn available(&self) -> i32 {
        self.total_seats - self.committed()
    }

    pub fn check_invariant(&self) -> CoreResult<()> {
        if self.seats_on_hold < 0 || self.seats_issued < 0 || self.committed() > self.total_seats {
            return Err(CoreError::InternalError(format!(
                "bucket {} counters out of range: total={} on_hold={} issued={}",
                self.id, self.total_seats, self.seats_on_hold, self.seats_issued
            )));
        }
        Ok(())
    }

    /// Replaces capacity and pricing. Counters are untouched; capacity may not
    /// drop below what is already committed.
    pub fn apply_spec(&mut self, spec: &BucketSpec) -> CoreResult<()> {
        spec.validate()?;
        if spec.total_seats < self.committed() {
            return Err(CoreError::Conflict(format!(
                "total_seats {} is below the {} seats already held or issued",
                spec.total_seats,
                self.committed()
            )));
        }
        self.total_seats = spec.total_seats;
        self.base_fare = round_money(spec.base_fare);
        self.tax_amount = round_money(spec.tax_amount);
        self.fee_amount = round_money(spec.fee_amount);
        self.currency = spec.currency.to_ascii_uppercase();
        self.touch();
        Ok(())
    }

    pub fn reserve(&mut self, quantity: i32) -> CoreResult<()> {
        ensure_positive(quantity)?;
        let available = self.available();
        if quantity > available {
            return Err(CoreError::CapacityExceeded {
                requested: quantity,
                available: available.max(0),
            });
        }
        self.seats_on_hold += quantity;
        self.touch();
        Ok(())
    }

    /// Moves `quantity` held seats to issued.
    pub fn issue_held(&mut self, quantity: i32) -> CoreResult<()> {
        ensure_positive(quantity)?;
        if quantity > self.seats_on_hold {
            return Err(CoreError::InternalError(format!(
                "bucket {} has {} seats on hold, cannot issue {}",
                self.id, self.seats_on_hold, quantity
            )));
        }
        self.seats_on_hold -= quantity;
        self.seats_issued += quantity;
        self.touch();
        Ok(())
    }

    /// Returns `quantity` held seats to the available pool.
    pub fn release_held(&mut self, quantity: i32) -> CoreResult<()> {
        ensure_positive(quantity)?;
        if quantity > self.seats_on_hold {
            return Err(CoreError::InternalError(format!(
                "bucket {} has {} seats on hold, cannot release {}",
                self.id, self.seats_on_hold, quantity
            )));
        }
        self.seats_on_hold -= quantity;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

fn ensure_positive(quantity: i32) -> CoreResult<()> {
    if quantity <= 0 {
        return Err(CoreError::ValidationError(
            "quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Currency amounts: non-negative with at most two fractional digits.
pub fn validate_amount(field: &str, amount: Decimal) -> CoreResult<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(CoreError::ValidationError(format!("{} must not be negative", field)));
    }
    if amount.normalize().scale() > 2 {
        return Err(CoreError::ValidationError(format!(
            "{} must have at most two decimal places",
            field
        )));
    }
    Ok(())
}

pub fn validate_currency(code: &str) -> CoreResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::ValidationError(format!("invalid currency code '{}'", code)));
    }
    Ok(())
}

/// Two-decimal currency rounding, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// All buckets of a flight group must share one currency; `pax_type` is the
/// bucket being written and is ignored in the comparison.
pub fn ensure_currency_matches(existing: &[SeatBucket], pax_type: PaxType, currency: &str) -> CoreResult<()> {
    let mismatch = existing
        .iter()
        .filter(|b| b.pax_type != pax_type)
        .find(|b| !b.currency.eq_ignore_ascii_case(currency));
    if let Some(other) = mismatch {
        return Err(CoreError::ValidationError(format!(
            "currency {} differs from {} bucket currency {}",
            currency.to_ascii_uppercase(),
            other.pax_type,
            other.currency
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn spec(total: i32) -> BucketSpec {
        BucketSpec {
            total_seats: total,
            base_fare: money("199.90"),
            tax_amount: money("35.10"),
            fee_amount: money("5.00"),
            currency: "eur".to_string(),
        }
    }

    #[test]
    fn test_reserve_confirm_release_counters() {
        let mut bucket = SeatBucket::new(Uuid::new_v4(), PaxType::Adult, &spec(10)).unwrap();
        assert_eq!(bucket.currency, "EUR");

        bucket.reserve(7).unwrap();
        assert_eq!(bucket.seats_on_hold, 7);

        let err = bucket.reserve(4).unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { requested: 4, available: 3 }));

        bucket.reserve(3).unwrap();
        assert_eq!(bucket.available(), 0);

        bucket.issue_held(7).unwrap();
        assert_eq!(bucket.seats_on_hold, 3);
        assert_eq!(bucket.seats_issued, 7);

        bucket.release_held(3).unwrap();
        assert_eq!(bucket.seats_on_hold, 0);
        assert_eq!(bucket.available(), 3);
        bucket.check_invariant().unwrap();
        assert_eq!(bucket.version, 4);
    }

    #[test]
    fn test_counters_never_go_negative() {
        let mut bucket = SeatBucket::new(Uuid::new_v4(), PaxType::Child, &spec(2)).unwrap();
        assert!(bucket.release_held(1).is_err());
        assert!(bucket.issue_held(1).is_err());
        assert!(bucket.reserve(0).is_err());
        assert!(bucket.reserve(-3).is_err());
        assert_eq!(bucket.seats_on_hold, 0);
    }

    #[test]
    fn test_capacity_cannot_shrink_below_committed() {
        let mut bucket = SeatBucket::new(Uuid::new_v4(), PaxType::Adult, &spec(10)).unwrap();
        bucket.reserve(6).unwrap();
        assert!(matches!(bucket.apply_spec(&spec(5)), Err(CoreError::Conflict(_))));
        bucket.apply_spec(&spec(6)).unwrap();
        assert_eq!(bucket.available(), 0);
    }

    #[test]
    fn test_amount_validation() {
        assert!(validate_amount("base_fare", money("10.5")).is_ok());
        assert!(validate_amount("base_fare", money("10.500")).is_ok());
        assert!(validate_amount("base_fare", money("10.505")).is_err());
        assert!(validate_amount("tax_amount", money("-0.01")).is_err());
        assert!(validate_currency("US").is_err());
        assert!(validate_currency("USD").is_ok());
    }

    #[test]
    fn test_currency_consistency() {
        let group = Uuid::new_v4();
        let adult = SeatBucket::new(group, PaxType::Adult, &spec(10)).unwrap();
        assert!(ensure_currency_matches(&[adult.clone()], PaxType::Child, "EUR").is_ok());
        assert!(ensure_currency_matches(&[adult.clone()], PaxType::Child, "USD").is_err());
        // rewriting the only bucket may change its currency
        assert!(ensure_currency_matches(&[adult], PaxType::Adult, "USD").is_ok());
    }

    #[test]
    fn test_pax_type_wire_names() {
        assert_eq!(serde_json::to_string(&PaxType::Infant).unwrap(), "\"INF\"");
        assert_eq!("chd".parse::<PaxType>().unwrap(), PaxType::Child);
    }
}
