use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PnrMode {
    GroupPnr,
    PerBookingPnr,
}

impl PnrMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PnrMode::GroupPnr => "GROUP_PNR",
            PnrMode::PerBookingPnr => "PER_BOOKING_PNR",
        }
    }
}

impl FromStr for PnrMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GROUP_PNR" => Ok(PnrMode::GroupPnr),
            "PER_BOOKING_PNR" => Ok(PnrMode::PerBookingPnr),
            other => Err(CoreError::ValidationError(format!("Unknown pnr mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightGroupStatus {
    Draft,
    Published,
    Closed,
    Cancelled,
}

impl FlightGroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightGroupStatus::Draft => "DRAFT",
            FlightGroupStatus::Published => "PUBLISHED",
            FlightGroupStatus::Closed => "CLOSED",
            FlightGroupStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlightGroupStatus::Closed | FlightGroupStatus::Cancelled)
    }
}

impl fmt::Display for FlightGroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightGroupStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(FlightGroupStatus::Draft),
            "PUBLISHED" => Ok(FlightGroupStatus::Published),
            "CLOSED" => Ok(FlightGroupStatus::Closed),
            "CANCELLED" => Ok(FlightGroupStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!(
                "Unknown flight group status: {}",
                other
            ))),
        }
    }
}

/// A block of seats on one flight sold to a single agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightGroup {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub carrier_code: String,
    pub flight_number: String,
    pub pnr_mode: PnrMode,
    pub origin: String,
    pub destination: String,
    pub departure_time_utc: DateTime<Utc>,
    pub departure_time_local: NaiveDateTime,
    pub arrival_time_utc: DateTime<Utc>,
    pub arrival_time_local: NaiveDateTime,
    pub sales_start: DateTime<Utc>,
    pub sales_end: DateTime<Utc>,
    pub status: FlightGroupStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlightGroup {
    /// Builds a DRAFT group from validated input.
    pub fn create(input: NewFlightGroup, created_by: Uuid) -> CoreResult<Self> {
        let input = input.normalized()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            agency_id: input.agency_id,
            carrier_code: input.carrier_code,
            flight_number: input.flight_number,
            pnr_mode: input.pnr_mode,
            origin: input.origin,
            destination: input.destination,
            departure_time_utc: input.departure_time_utc,
            departure_time_local: input.departure_time_local,
            arrival_time_utc: input.arrival_time_utc,
            arrival_time_local: input.arrival_time_local,
            sales_start: input.sales_start,
            sales_end: input.sales_end,
            status: FlightGroupStatus::Draft,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlightGroup {
    pub agency_id: Uuid,
    pub carrier_code: String,
    pub flight_number: String,
    pub pnr_mode: PnrMode,
    pub origin: String,
    pub destination: String,
    pub departure_time_utc: DateTime<Utc>,
    pub departure_time_local: NaiveDateTime,
    pub arrival_time_utc: DateTime<Utc>,
    pub arrival_time_local: NaiveDateTime,
    pub sales_start: DateTime<Utc>,
    pub sales_end: DateTime<Utc>,
}

impl NewFlightGroup {
    /// Uppercases codes and checks field formats and time ordering.
    pub fn normalized(mut self) -> CoreResult<Self> {
        self.carrier_code = self.carrier_code.trim().to_ascii_uppercase();
        if !(2..=3).contains(&self.carrier_code.len())
            || !self.carrier_code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CoreError::ValidationError(format!(
                "invalid carrier code '{}'",
                self.carrier_code
            )));
        }

        self.flight_number = self.flight_number.trim().to_ascii_uppercase();
        if self.flight_number.is_empty()
            || self.flight_number.len() > 5
            || !self.flight_number.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CoreError::ValidationError(format!(
                "invalid flight number '{}'",
                self.flight_number
            )));
        }

        self.origin = airport_code(&self.origin)?;
        self.destination = airport_code(&self.destination)?;
        if self.origin == self.destination {
            return Err(CoreError::ValidationError(
                "origin and destination must differ".to_string(),
            ));
        }

        if self.arrival_time_utc <= self.departure_time_utc {
            return Err(CoreError::ValidationError(
                "arrival must be after departure".to_string(),
            ));
        }
        if self.sales_start > self.sales_end {
            return Err(CoreError::ValidationError(
                "sales_start must not be after sales_end".to_string(),
            ));
        }
        Ok(self)
    }
}

fn airport_code(raw: &str) -> CoreResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::ValidationError(format!("invalid airport code '{}'", raw)));
    }
    Ok(code)
}
