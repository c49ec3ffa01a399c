use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Extension, Json, Router,
};
use groupdesk_core::{Capability, CoreError, Identity, Role, User};
use groupdesk_shared::Masked;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{auth::hash_password, error::AppError, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(custom(function = "validate_password"))]
    pub password: Masked<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

fn validate_password(password: &Masked<String>) -> Result<(), ValidationError> {
    let len = password.expose().chars().count();
    if !(8..=128).contains(&len) {
        return Err(ValidationError::new("password_length"));
    }
    Ok(())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/agencies/{id}/users", get(list_users).post(create_user))
        .route("/users/{id}/active", patch(set_active))
        .route("/users/{id}", delete(delete_user))
}

async fn create_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(agency_id): Path<Uuid>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    identity.require(Capability::ManageUsers, agency_id)?;
    req.validate()?;
    if !identity.role.can_grant(req.role) {
        return Err(CoreError::Forbidden(format!("{} may not create {} logins", identity.role, req.role)).into());
    }
    state
        .agencies
        .get(agency_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("agency {}", agency_id)))?;

    let hash = hash_password(req.password.into_inner(), state.auth.bcrypt_cost).await?;
    let user = User::new(agency_id, &req.username, hash, req.role)?;
    let user = state.users.create(&user).await?;
    tracing::info!("User {} ({}) created in agency {}", user.username, user.role, agency_id);

    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(agency_id): Path<Uuid>,
) -> Result<Json<Vec<User>>, AppError> {
    identity.require(Capability::ViewAgency, agency_id)?;
    Ok(Json(state.users.list(agency_id).await?))
}

async fn set_active(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<User>, AppError> {
    managed_user(&state, &identity, id).await?;
    let user = state.users.set_active(id, req.is_active).await?;
    tracing::info!("User {} active={}", user.id, user.is_active);
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    managed_user(&state, &identity, id).await?;
    state.users.delete(id).await?;
    tracing::info!("User {} deleted by {}", id, identity.user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Loads a user the caller may administer. Nobody manages their own login
/// and managers never touch administrators.
async fn managed_user(state: &AppState, identity: &Identity, id: Uuid) -> Result<User, AppError> {
    identity.authorize(Capability::ManageUsers)?;
    let user = state
        .users
        .get(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("user {}", id)))?;
    identity.ensure_agency(user.agency_id)?;

    if user.id == identity.user_id {
        return Err(CoreError::Conflict("cannot modify your own login".to_string()).into());
    }
    if !identity.role.can_grant(user.role) {
        return Err(CoreError::Forbidden(format!("{} may not manage {} logins", identity.role, user.role)).into());
    }
    Ok(user)
}
