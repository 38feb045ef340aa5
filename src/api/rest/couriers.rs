use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::courier::CourierState;
use crate::models::events::CourierStatusEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers/:id/position", get(get_position))
        .route("/couriers/:id/start", post(start_delivery))
        .route("/couriers/:id/stop", post(stop_delivery))
        .route("/couriers/:id/offline", post(go_offline))
        .route("/couriers/:id/availability", patch(update_availability))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDeliveryBody {
    pub order_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub available: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub courier_id: String,
    pub available: bool,
}

async fn get_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CourierState>, AppError> {
    Ok(Json(state.relay.current_position(&id)?))
}

async fn start_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<StartDeliveryBody>>,
) -> Result<Json<CourierStatusEvent>, AppError> {
    let order_id = body.and_then(|Json(body)| body.order_id);
    let event = state
        .relay
        .start_delivery(Some(&id), order_id.as_deref())
        .await?;
    Ok(Json(event))
}

async fn stop_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CourierStatusEvent>, AppError> {
    Ok(Json(state.relay.stop_delivery(Some(&id)).await?))
}

async fn go_offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CourierStatusEvent>, AppError> {
    Ok(Json(state.relay.go_offline(Some(&id)).await?))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::InvalidData("courier id cannot be empty".to_string()));
    }

    state.directory.set_availability(&id, payload.available);
    Ok(Json(AvailabilityResponse {
        courier_id: id,
        available: payload.available,
    }))
}
