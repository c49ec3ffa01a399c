//! Row structs for runtime-checked queries and their domain conversions.

use chrono::{DateTime, NaiveDateTime, Utc};
use groupdesk_core::{Agency, FlightGroup, SeatBucket, SeatHold, User};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

pub(crate) const AGENCY_COLUMNS: &str =
    "id, name, code, parent_agency_id, status, created_at, updated_at";

pub(crate) const USER_COLUMNS: &str =
    "id, agency_id, username, password_hash, role, is_active, created_at, updated_at";

pub(crate) const GROUP_COLUMNS: &str = "id, agency_id, carrier_code, flight_number, pnr_mode, \
     origin, destination, departure_time_utc, departure_time_local, arrival_time_utc, \
     arrival_time_local, sales_start, sales_end, status, created_by, created_at, updated_at";

pub(crate) const BUCKET_COLUMNS: &str = "id, flight_group_id, pax_type, total_seats, \
     seats_on_hold, seats_issued, base_fare, tax_amount, fee_amount, currency, version, \
     created_at, updated_at";

pub(crate) const HOLD_COLUMNS: &str = "id, bucket_id, flight_group_id, agency_id, pax_type, \
     quantity, status, created_by, expires_at, created_at, resolved_at";

fn parse<T: FromStr>(column: &str, value: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("unexpected {} value '{}'", column, value)))
}

#[derive(sqlx::FromRow)]
pub(crate) struct AgencyRow {
    id: Uuid,
    name: String,
    code: String,
    parent_agency_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AgencyRow> for Agency {
    type Error = StoreError;

    fn try_from(row: AgencyRow) -> Result<Self, Self::Error> {
        Ok(Agency {
            id: row.id,
            name: row.name,
            code: row.code,
            parent_agency_id: row.parent_agency_id,
            status: parse("agency status", &row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    agency_id: Uuid,
    username: String,
    password_hash: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            agency_id: row.agency_id,
            username: row.username,
            password_hash: row.password_hash,
            role: parse("role", &row.role)?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FlightGroupRow {
    id: Uuid,
    agency_id: Uuid,
    carrier_code: String,
    flight_number: String,
    pnr_mode: String,
    origin: String,
    destination: String,
    departure_time_utc: DateTime<Utc>,
    departure_time_local: NaiveDateTime,
    arrival_time_utc: DateTime<Utc>,
    arrival_time_local: NaiveDateTime,
    sales_start: DateTime<Utc>,
    sales_end: DateTime<Utc>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlightGroupRow> for FlightGroup {
    type Error = StoreError;

    fn try_from(row: FlightGroupRow) -> Result<Self, Self::Error> {
        Ok(FlightGroup {
            id: row.id,
            agency_id: row.agency_id,
            carrier_code: row.carrier_code,
            flight_number: row.flight_number,
            pnr_mode: parse("pnr_mode", &row.pnr_mode)?,
            origin: row.origin,
            destination: row.destination,
            departure_time_utc: row.departure_time_utc,
            departure_time_local: row.departure_time_local,
            arrival_time_utc: row.arrival_time_utc,
            arrival_time_local: row.arrival_time_local,
            sales_start: row.sales_start,
            sales_end: row.sales_end,
            status: parse("flight group status", &row.status)?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SeatBucketRow {
    id: Uuid,
    flight_group_id: Uuid,
    pax_type: String,
    total_seats: i32,
    seats_on_hold: i32,
    seats_issued: i32,
    base_fare: Decimal,
    tax_amount: Decimal,
    fee_amount: Decimal,
    currency: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SeatBucketRow> for SeatBucket {
    type Error = StoreError;

    fn try_from(row: SeatBucketRow) -> Result<Self, Self::Error> {
        Ok(SeatBucket {
            id: row.id,
            flight_group_id: row.flight_group_id,
            pax_type: parse("pax_type", &row.pax_type)?,
            total_seats: row.total_seats,
            seats_on_hold: row.seats_on_hold,
            seats_issued: row.seats_issued,
            base_fare: row.base_fare,
            tax_amount: row.tax_amount,
            fee_amount: row.fee_amount,
            currency: row.currency,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SeatHoldRow {
    id: Uuid,
    bucket_id: Uuid,
    flight_group_id: Uuid,
    agency_id: Uuid,
    pax_type: String,
    quantity: i32,
    status: String,
    created_by: Uuid,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<SeatHoldRow> for SeatHold {
    type Error = StoreError;

    fn try_from(row: SeatHoldRow) -> Result<Self, Self::Error> {
        Ok(SeatHold {
            id: row.id,
            bucket_id: row.bucket_id,
            flight_group_id: row.flight_group_id,
            agency_id: row.agency_id,
            pax_type: parse("pax_type", &row.pax_type)?,
            quantity: row.quantity,
            status: parse("hold status", &row.status)?,
            created_by: row.created_by,
            expires_at: row.expires_at,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

/// Converts a batch of rows, failing on the first corrupt one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
