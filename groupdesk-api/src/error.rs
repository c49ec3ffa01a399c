use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use groupdesk_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            AppError::Core(err) => {
                let status = match err {
                    CoreError::ValidationError(_) => StatusCode::BAD_REQUEST,
                    CoreError::Forbidden(_) | CoreError::GroupNotOnSale { .. } => StatusCode::FORBIDDEN,
                    CoreError::NotFound(_) | CoreError::HoldNotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::CapacityExceeded { .. }
                    | CoreError::InvalidTransition { .. }
                    | CoreError::Conflict(_) => StatusCode::CONFLICT,
                    CoreError::LockTimeout | CoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                    CoreError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal Server Error: {}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: CoreError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_core_error_status_mapping() {
        assert_eq!(status_of(CoreError::CapacityExceeded { requested: 3, available: 1 }), StatusCode::CONFLICT);
        assert_eq!(
            status_of(CoreError::GroupNotOnSale { group_id: Uuid::nil(), reason: "closed".into() }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(CoreError::HoldNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(CoreError::LockTimeout), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(CoreError::ValidationError("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::InternalError("boom".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unauthorized_status() {
        let response = AppError::Unauthorized("missing token".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
