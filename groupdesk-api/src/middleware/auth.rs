use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use chrono::{DateTime, Duration, Utc};
use groupdesk_core::{Agency, Identity, Role, User};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::{AppState, AuthConfig}};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub agency_id: Uuid,
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

pub fn issue_token(auth: &AuthConfig, user: &User, now: DateTime<Utc>) -> Result<(String, DateTime<Utc>), AppError> {
    let expires_at = now + Duration::seconds(auth.expiration as i64);
    let claims = Claims {
        sub: user.id,
        agency_id: user.agency_id,
        role: user.role,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| anyhow::anyhow!("Token encoding failed: {}", e))?;
    Ok((token, expires_at))
}

// ============================================================================
// Authentication Middleware
// ============================================================================

/// Verifies the bearer token and that its user is still an active login,
/// then injects the caller's `Identity` into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| AppError::Unauthorized("missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::Unauthorized("invalid or expired token".to_string())
    })?;
    let claims = token_data.claims;

    // Deactivated or deleted logins lose access before their token expires.
    let user = state
        .users
        .get(claims.sub)
        .await?
        .filter(|u| u.is_active && u.agency_id == claims.agency_id)
        .ok_or_else(|| AppError::Unauthorized("user is no longer active".to_string()))?;

    // Suspending an agency cuts off tokens already issued to its users.
    state
        .agencies
        .get(user.agency_id)
        .await?
        .filter(Agency::is_active)
        .ok_or_else(|| AppError::Unauthorized("agency is not active".to_string()))?;

    req.extensions_mut()
        .insert(Identity::new(user.id, user.agency_id, user.role));

    Ok(next.run(req).await)
}
