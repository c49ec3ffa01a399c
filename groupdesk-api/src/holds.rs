use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use groupdesk_core::{HoldResolution, Identity, SeatHold};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, groups::parse_pax_type, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct HoldSeatsRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    #[serde(rename = "holdId")]
    pub hold_id: Uuid,
    #[serde(flatten)]
    pub hold: SeatHold,
}

impl From<SeatHold> for HoldResponse {
    fn from(hold: SeatHold) -> Self {
        Self { hold_id: hold.id, hold }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups/{id}/seat-buckets/{pax_type}/hold", post(hold_seats))
        .route("/holds/{id}", get(get_hold))
        .route("/holds/{id}/confirm", post(confirm_hold))
        .route("/holds/{id}/release", post(release_hold))
}

async fn hold_seats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((group_id, pax_type)): Path<(Uuid, String)>,
    Json(req): Json<HoldSeatsRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), AppError> {
    req.validate()?;
    let pax_type = parse_pax_type(&pax_type)?;
    let hold = state
        .inventory
        .hold_seats(&identity, group_id, pax_type, req.quantity, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(hold.into())))
}

async fn get_hold(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<HoldResponse>, AppError> {
    let hold = state.inventory.get_hold(&identity, id).await?;
    Ok(Json(hold.into()))
}

async fn confirm_hold(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<HoldResolution>, AppError> {
    let resolution = state.inventory.confirm_hold(&identity, id, Utc::now()).await?;
    if resolution.changed {
        tracing::info!("Hold {} confirmed by {}", id, identity.user_id);
    }
    Ok(Json(resolution))
}

async fn release_hold(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<HoldResolution>, AppError> {
    let resolution = state.inventory.release_hold(&identity, id, Utc::now()).await?;
    if resolution.changed {
        tracing::info!("Hold {} released by {}", id, identity.user_id);
    }
    Ok(Json(resolution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use groupdesk_core::{HoldRequest, PaxType};

    #[test]
    fn test_hold_response_exposes_hold_id() {
        let request = HoldRequest {
            flight_group_id: Uuid::new_v4(),
            pax_type: PaxType::Child,
            quantity: 2,
            agency_id: Uuid::new_v4(),
            requested_by: Uuid::new_v4(),
            ttl: Duration::minutes(15),
            now: Utc::now(),
        };
        let hold = SeatHold::open(Uuid::new_v4(), &request).unwrap();
        let body = serde_json::to_value(HoldResponse::from(hold.clone())).unwrap();

        assert_eq!(body["holdId"], hold.id.to_string());
        assert_eq!(body["id"], hold.id.to_string());
        assert_eq!(body["status"], "HELD");
        assert_eq!(body["pax_type"], "CHD");
        assert_eq!(body["quantity"], 2);
    }
}
