pub mod access;
pub mod agency;
pub mod flight_group;
pub mod hold;
pub mod lifecycle;
pub mod repository;
pub mod seat_bucket;
pub mod user;

use uuid::Uuid;

pub use access::{Capability, Identity};
pub use agency::{Agency, AgencyStatus};
pub use flight_group::{FlightGroup, FlightGroupStatus, NewFlightGroup, PnrMode};
pub use hold::{HoldRequest, HoldResolution, HoldStatus, SeatHold};
pub use repository::{
    AgencyRepository, FlightGroupRepository, InventoryLedger, JobQueue, StatusChange, UserRepository,
};
pub use seat_bucket::{BucketSpec, PaxType, SeatBucket};
pub use user::{Role, User};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Insufficient seats: requested {requested}, available {available}")]
    CapacityExceeded { requested: i32, available: i32 },
    #[error("Flight group {group_id} is not on sale: {reason}")]
    GroupNotOnSale { group_id: Uuid, reason: String },
    #[error("Hold not found: {0}")]
    HoldNotFound(Uuid),
    #[error("Timed out waiting for inventory lock")]
    LockTimeout,
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Transient store failure: {0}")]
    Transient(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    /// Contention and connection-level failures that are worth one more attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::LockTimeout | CoreError::Transient(_))
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::CapacityExceeded { .. } => "CapacityExceeded",
            CoreError::GroupNotOnSale { .. } => "GroupNotOnSale",
            CoreError::HoldNotFound(_) => "HoldNotFound",
            CoreError::LockTimeout => "LockTimeout",
            CoreError::InvalidTransition { .. } => "InvalidTransition",
            CoreError::ValidationError(_) => "ValidationError",
            CoreError::NotFound(_) => "NotFound",
            CoreError::Forbidden(_) => "Forbidden",
            CoreError::Conflict(_) => "Conflict",
            CoreError::Transient(_) => "LockTimeout",
            CoreError::InternalError(_) => "InternalError",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(CoreError::LockTimeout.is_retryable());
        assert!(CoreError::Transient("deadlock detected".into()).is_retryable());
        assert!(!CoreError::HoldNotFound(Uuid::new_v4()).is_retryable());
        assert!(!CoreError::CapacityExceeded { requested: 2, available: 1 }.is_retryable());
    }

    #[test]
    fn test_transient_surfaces_as_lock_timeout_code() {
        assert_eq!(CoreError::Transient("connection reset".into()).code(), "LockTimeout");
        assert_eq!(
            CoreError::GroupNotOnSale { group_id: Uuid::nil(), reason: "closed".into() }.code(),
            "GroupNotOnSale"
        );
    }
}
