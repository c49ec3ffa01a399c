use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::Utc;
use groupdesk_core::Identity;
use serde::Serialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub expired: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/holds/expire", post(expire_holds))
}

async fn expire_holds(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ExpireResponse>, AppError> {
    let expired = state.inventory.expire_stale_holds(&identity, Utc::now()).await?;
    tracing::info!("On-demand sweep by {} expired {} holds", identity.user_id, expired);
    Ok(Json(ExpireResponse { expired }))
}
