use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult, PaxType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Held,
    Confirmed,
    Released,
    Expired,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Held => "HELD",
            HoldStatus::Confirmed => "CONFIRMED",
            HoldStatus::Released => "RELEASED",
            HoldStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HELD" => Ok(HoldStatus::Held),
            "CONFIRMED" => Ok(HoldStatus::Confirmed),
            "RELEASED" => Ok(HoldStatus::Released),
            "EXPIRED" => Ok(HoldStatus::Expired),
            other => Err(CoreError::InternalError(format!("Unknown hold status: {}", other))),
        }
    }
}

/// Seats reserved against one bucket. While HELD its quantity is counted in
/// the bucket's `seats_on_hold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatHold {
    pub id: Uuid,
    pub bucket_id: Uuid,
    pub flight_group_id: Uuid,
    pub agency_id: Uuid,
    pub pax_type: PaxType,
    pub quantity: i32,
    pub status: HoldStatus,
    pub created_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SeatHold {
    pub fn open(bucket_id: Uuid, request: &HoldRequest) -> CoreResult<Self> {
        let expires_at = request.expires_at()?;
        Ok(Self {
            id: Uuid::new_v4(),
            bucket_id,
            flight_group_id: request.flight_group_id,
            agency_id: request.agency_id,
            pax_type: request.pax_type,
            quantity: request.quantity,
            status: HoldStatus::Held,
            created_by: request.requested_by,
            expires_at,
            created_at: request.now,
            resolved_at: None,
        })
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Held && self.expires_at > now
    }

    /// HELD but past its expiry; the sweeper has not reached it yet.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Held && self.expires_at <= now
    }

    pub fn resolve(&mut self, status: HoldStatus, now: DateTime<Utc>) {
        self.status = status;
        self.resolved_at = Some(now);
    }
}

#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub flight_group_id: Uuid,
    pub pax_type: PaxType,
    pub quantity: i32,
    pub agency_id: Uuid,
    pub requested_by: Uuid,
    pub ttl: Duration,
    pub now: DateTime<Utc>,
}

impl HoldRequest {
    pub fn validate(&self) -> CoreResult<()> {
        if self.quantity <= 0 {
            return Err(CoreError::ValidationError(
                "quantity must be greater than zero".to_string(),
            ));
        }
        if self.ttl <= Duration::zero() {
            return Err(CoreError::ValidationError("hold ttl must be positive".to_string()));
        }
        self.expires_at().map(|_| ())
    }

    pub fn expires_at(&self) -> CoreResult<DateTime<Utc>> {
        self.now.checked_add_signed(self.ttl).ok_or_else(|| {
            CoreError::ValidationError("hold ttl is out of range".to_string())
        })
    }
}

/// Outcome of confirm/release. `changed` is false when the call was a no-op
/// on an already resolved hold.
#[derive(Debug, Clone, Serialize)]
pub struct HoldResolution {
    pub hold: SeatHold,
    pub changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: i32) -> HoldRequest {
        HoldRequest {
            flight_group_id: Uuid::new_v4(),
            pax_type: PaxType::Adult,
            quantity,
            agency_id: Uuid::new_v4(),
            requested_by: Uuid::new_v4(),
            ttl: Duration::minutes(15),
            now: Utc::now(),
        }
    }

    #[test]
    fn test_hold_expiry_window() {
        let req = request(2);
        let hold = SeatHold::open(Uuid::new_v4(), &req).unwrap();
        assert!(hold.is_live(req.now));
        assert!(!hold.is_stale(req.now + Duration::minutes(14)));
        assert!(hold.is_stale(req.now + Duration::minutes(15)));
        assert!(!hold.is_live(req.now + Duration::minutes(15)));
    }

    #[test]
    fn test_resolved_hold_is_never_stale() {
        let req = request(1);
        let mut hold = SeatHold::open(Uuid::new_v4(), &req).unwrap();
        hold.resolve(HoldStatus::Released, req.now);
        assert!(!hold.is_stale(req.now + Duration::hours(1)));
        assert_eq!(hold.resolved_at, Some(req.now));
    }

    #[test]
    fn test_request_validation() {
        assert!(request(0).validate().is_err());
        let mut req = request(1);
        req.ttl = Duration::zero();
        assert!(req.validate().is_err());
        assert!(request(1).validate().is_ok());
    }

    #[test]
    fn test_ttl_past_calendar_range_is_rejected() {
        let mut req = request(1);
        req.ttl = Duration::MAX;
        assert!(matches!(req.validate(), Err(CoreError::ValidationError(_))));
        assert!(SeatHold::open(Uuid::new_v4(), &req).is_err());
    }
}
