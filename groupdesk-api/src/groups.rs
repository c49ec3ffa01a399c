use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, put},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use groupdesk_core::{
    BucketSpec, Capability, CoreError, FlightGroup, FlightGroupStatus, Identity, NewFlightGroup, PaxType,
    PnrMode, SeatBucket, StatusChange,
};
use groupdesk_inventory::FareQuote;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFlightGroupRequest {
    /// Defaults to the caller's agency.
    pub agency_id: Option<Uuid>,
    #[validate(length(min = 2, max = 3))]
    pub carrier_code: String,
    #[validate(length(min = 1, max = 5))]
    pub flight_number: String,
    pub pnr_mode: PnrMode,
    #[validate(length(equal = 3))]
    pub origin: String,
    #[validate(length(equal = 3))]
    pub destination: String,
    pub departure_time_utc: DateTime<Utc>,
    pub departure_time_local: NaiveDateTime,
    pub arrival_time_utc: DateTime<Utc>,
    pub arrival_time_local: NaiveDateTime,
    pub sales_start: DateTime<Utc>,
    pub sales_end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListGroupsQuery {
    pub agency_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: FlightGroupStatus,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct FlightGroupDetail {
    #[serde(flatten)]
    pub group: FlightGroup,
    pub seat_buckets: Vec<SeatBucket>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/{id}", get(get_group).delete(delete_group))
        .route("/groups/{id}/status", patch(update_status))
        .route("/groups/{id}/seat-buckets", get(list_buckets))
        .route("/groups/{id}/seat-buckets/{pax_type}", put(upsert_bucket))
        .route("/groups/{id}/seat-buckets/{pax_type}/quote", get(quote))
}

pub(crate) fn parse_pax_type(raw: &str) -> Result<PaxType, AppError> {
    Ok(raw.parse::<PaxType>()?)
}

// ============================================================================
// Flight groups
// ============================================================================

async fn create_group(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateFlightGroupRequest>,
) -> Result<(StatusCode, Json<FlightGroup>), AppError> {
    req.validate()?;
    let agency_id = req.agency_id.unwrap_or(identity.agency_id);
    identity.require(Capability::ManageFlightGroups, agency_id)?;
    state
        .agencies
        .get(agency_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("agency {}", agency_id)))?;

    let input = NewFlightGroup {
        agency_id,
        carrier_code: req.carrier_code,
        flight_number: req.flight_number,
        pnr_mode: req.pnr_mode,
        origin: req.origin,
        destination: req.destination,
        departure_time_utc: req.departure_time_utc,
        departure_time_local: req.departure_time_local,
        arrival_time_utc: req.arrival_time_utc,
        arrival_time_local: req.arrival_time_local,
        sales_start: req.sales_start,
        sales_end: req.sales_end,
    };
    let group = FlightGroup::create(input, identity.user_id)?;
    let group = state.groups.create(&group).await?;
    tracing::info!(
        "Flight group {} ({}{} {}-{}) created by {}",
        group.id, group.carrier_code, group.flight_number, group.origin, group.destination, identity.user_id
    );

    Ok((StatusCode::CREATED, Json(group)))
}

async fn list_groups(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Vec<FlightGroup>>, AppError> {
    identity.authorize(Capability::ViewFlightGroups)?;
    let scope = match query.agency_id {
        Some(agency_id) => {
            identity.ensure_agency(agency_id)?;
            Some(agency_id)
        }
        None if identity.is_admin() => None,
        None => Some(identity.agency_id),
    };
    Ok(Json(state.groups.list(scope).await?))
}

async fn get_group(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<FlightGroupDetail>, AppError> {
    let group = load_group(&state, &identity, Capability::ViewFlightGroups, id).await?;
    let seat_buckets = state.groups.list_buckets(id).await?;
    Ok(Json(FlightGroupDetail { group, seat_buckets }))
}

async fn delete_group(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    load_group(&state, &identity, Capability::ManageFlightGroups, id).await?;
    state.groups.delete(id).await?;
    tracing::info!("Flight group {} deleted by {}", id, identity.user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<StatusChange>, AppError> {
    let change = state
        .inventory
        .transition_group(&identity, id, req.status, Utc::now())
        .await?;
    tracing::info!(
        "Flight group {} is now {} ({} holds released)",
        id, change.group.status, change.released_holds
    );
    Ok(Json(change))
}

// ============================================================================
// Seat buckets
// ============================================================================

async fn list_buckets(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SeatBucket>>, AppError> {
    Ok(Json(state.inventory.list_buckets(&identity, id).await?))
}

async fn upsert_bucket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, pax_type)): Path<(Uuid, String)>,
    Json(spec): Json<BucketSpec>,
) -> Result<Json<SeatBucket>, AppError> {
    let pax_type = parse_pax_type(&pax_type)?;
    let bucket = state.inventory.upsert_bucket(&identity, id, pax_type, &spec).await?;
    Ok(Json(bucket))
}

async fn quote(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, pax_type)): Path<(Uuid, String)>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<FareQuote>, AppError> {
    let pax_type = parse_pax_type(&pax_type)?;
    Ok(Json(state.inventory.quote(&identity, id, pax_type, query.quantity).await?))
}

async fn load_group(
    state: &AppState,
    identity: &Identity,
    capability: Capability,
    id: Uuid,
) -> Result<FlightGroup, AppError> {
    identity.authorize(capability)?;
    let group = state
        .groups
        .get(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("flight group {}", id)))?;
    identity.ensure_agency(group.agency_id)?;
    Ok(group)
}
