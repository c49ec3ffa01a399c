use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Extension, Json, Router,
};
use groupdesk_core::{Agency, AgencyStatus, Capability, CoreError, Identity};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAgencyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 2, max = 16))]
    pub code: String,
    pub parent_agency_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAgencyStatusRequest {
    pub status: AgencyStatus,
}

#[derive(Debug, Deserialize)]
pub struct SetParentRequest {
    pub parent_agency_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/agencies", get(list_agencies).post(create_agency))
        .route("/agencies/{id}", get(get_agency).delete(delete_agency))
        .route("/agencies/{id}/children", get(list_children))
        .route("/agencies/{id}/status", patch(update_status))
        .route("/agencies/{id}/parent", patch(set_parent))
}

async fn create_agency(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateAgencyRequest>,
) -> Result<(StatusCode, Json<Agency>), AppError> {
    identity.authorize(Capability::ManageAgencies)?;
    req.validate()?;

    let agency = Agency::new(&req.name, &req.code, req.parent_agency_id)?;
    let agency = state.agencies.create(&agency).await?;
    tracing::info!("Agency {} created by {}", agency.code, identity.user_id);

    Ok((StatusCode::CREATED, Json(agency)))
}

async fn list_agencies(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Agency>>, AppError> {
    identity.authorize(Capability::ViewAgency)?;
    let agencies = state
        .agencies
        .list()
        .await?
        .into_iter()
        .filter(|a| identity.can_access_agency(a.id))
        .collect();
    Ok(Json(agencies))
}

async fn get_agency(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Agency>, AppError> {
    identity.require(Capability::ViewAgency, id)?;
    Ok(Json(load_agency(&state, id).await?))
}

async fn list_children(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Agency>>, AppError> {
    identity.require(Capability::ViewAgency, id)?;
    load_agency(&state, id).await?;
    Ok(Json(state.agencies.list_children(id).await?))
}

async fn update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAgencyStatusRequest>,
) -> Result<Json<Agency>, AppError> {
    identity.authorize(Capability::ManageAgencies)?;
    if id == identity.agency_id && req.status != AgencyStatus::Active {
        return Err(CoreError::Conflict("cannot suspend your own agency".to_string()).into());
    }
    let agency = state.agencies.update_status(id, req.status).await?;
    tracing::info!("Agency {} is now {}", agency.code, agency.status);
    Ok(Json(agency))
}

async fn set_parent(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetParentRequest>,
) -> Result<Json<Agency>, AppError> {
    identity.authorize(Capability::ManageAgencies)?;
    Ok(Json(state.agencies.set_parent(id, req.parent_agency_id).await?))
}

async fn delete_agency(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    identity.authorize(Capability::ManageAgencies)?;
    if id == identity.agency_id {
        return Err(CoreError::Conflict("cannot delete your own agency".to_string()).into());
    }
    state.agencies.delete(id).await?;
    tracing::info!("Agency {} deleted by {}", id, identity.user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn load_agency(state: &AppState, id: Uuid) -> Result<Agency, AppError> {
    state
        .agencies
        .get(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("agency {}", id)).into())
}
