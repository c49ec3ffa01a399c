use groupdesk_core::CoreError;

// SQLSTATE codes the store reacts to.
const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] CoreError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(e) => e,
            StoreError::Database(e) => map_sqlx_error(e),
            StoreError::Redis(e) => CoreError::Transient(e.to_string()),
            StoreError::Serialization(e) => CoreError::InternalError(e.to_string()),
            StoreError::Corrupt(msg) => CoreError::InternalError(msg),
        }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let constraint = db.constraint().unwrap_or("constraint").to_string();
            match db.code().as_deref() {
                Some(LOCK_NOT_AVAILABLE) => CoreError::LockTimeout,
                Some(DEADLOCK_DETECTED) | Some(SERIALIZATION_FAILURE) => {
                    CoreError::Transient(db.message().to_string())
                }
                Some(UNIQUE_VIOLATION) => {
                    CoreError::Conflict(format!("duplicate value violates {}", constraint))
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    CoreError::Conflict(format!("operation violates {}", constraint))
                }
                Some(CHECK_VIOLATION) => {
                    CoreError::Conflict(format!("row violates {}", constraint))
                }
                _ => CoreError::InternalError(err.to_string()),
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => CoreError::Transient(err.to_string()),
        _ => CoreError::InternalError(err.to_string()),
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion_is_transient() {
        let err: CoreError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_domain_errors_pass_through() {
        let err: CoreError = StoreError::Domain(CoreError::LockTimeout).into();
        assert!(matches!(err, CoreError::LockTimeout));

        let err: CoreError = StoreError::Database(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, CoreError::InternalError(_)));
    }
}
