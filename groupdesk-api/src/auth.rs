use axum::{extract::State, routing::{get, post}, Extension, Json, Router};
use chrono::{DateTime, Utc};
use groupdesk_core::{agency::normalize_code, Agency, CoreError, Identity, User};
use groupdesk_shared::Masked;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::AppError, middleware::issue_token, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 2, max = 16))]
    pub agency_code: String,
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    pub password: Masked<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub agency: Agency,
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("invalid credentials".to_string())
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    req.validate()?;

    let agency = match normalize_code(&req.agency_code) {
        Ok(code) => state.agencies.get_by_code(&code).await?.filter(Agency::is_active),
        Err(_) => None,
    };
    let user = match &agency {
        Some(agency) => state
            .users
            .find_by_username(agency.id, req.username.trim())
            .await?
            .filter(|u| u.is_active),
        None => None,
    };

    let password = req.password.into_inner();
    let (agency, user) = match (agency, user) {
        (Some(agency), Some(user)) => (agency, user),
        _ => {
            // Spend the same bcrypt work so unknown logins answer no faster.
            hash_password(password, state.auth.bcrypt_cost).await?;
            return Err(invalid_credentials());
        }
    };

    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| anyhow::anyhow!("password check aborted: {}", e))?
        .map_err(|e| anyhow::anyhow!("password check failed: {}", e))?;
    if !verified {
        tracing::info!("Failed login for {} at agency {}", user.username, agency.code);
        return Err(invalid_credentials());
    }

    let (token, expires_at) = issue_token(&state.auth, &user, Utc::now())?;
    tracing::info!("User {} logged in at agency {}", user.id, agency.code);

    Ok(Json(LoginResponse { token, expires_at, user }))
}

async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<MeResponse>, AppError> {
    let user = state
        .users
        .get(identity.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("user {}", identity.user_id)))?;
    let agency = state
        .agencies
        .get(identity.agency_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("agency {}", identity.agency_id)))?;

    Ok(Json(MeResponse { user, agency }))
}

/// Runs bcrypt on the blocking pool.
pub(crate) async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| anyhow::anyhow!("password hashing aborted: {}", e))?
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash)
}
