use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::courier::{GeoPoint, NearbyCourier};
use crate::models::events::PositionReport;
use crate::relay::ReportOutcome;
use crate::state::AppState;
use crate::store::log::{DEFAULT_HISTORY_LIMIT, PositionRecord};

const DEFAULT_NEARBY_RADIUS_KM: f64 = 5.0;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/locations", post(report_position))
        .route("/locations/courier/:courier_id", get(courier_history))
        .route("/locations/latest/:courier_id", get(latest_position))
        .route("/locations/nearby", get(nearby_couriers))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub order_id: Option<String>,
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub count: usize,
    pub locations: Vec<PositionRecord>,
}

#[derive(Serialize)]
pub struct NearbyResponse {
    pub count: usize,
    pub couriers: Vec<NearbyCourier>,
}

async fn report_position(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PositionReport>,
) -> Result<Json<ReportOutcome>, AppError> {
    Ok(Json(state.relay.report_position(payload).await?))
}

async fn courier_history(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let locations = state
        .relay
        .history(
            &courier_id,
            query.order_id.as_deref(),
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;

    Ok(Json(HistoryResponse {
        count: locations.len(),
        locations,
    }))
}

async fn latest_position(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<String>,
) -> Result<Json<PositionRecord>, AppError> {
    Ok(Json(state.relay.latest_recorded(&courier_id).await?))
}

async fn nearby_couriers(
    State(state): State<Arc<AppState>>,
    query: Result<Query<NearbyQuery>, QueryRejection>,
) -> Result<Json<NearbyResponse>, AppError> {
    let Query(query) =
        query.map_err(|err| AppError::InvalidData(format!("invalid nearby query: {err}")))?;
    let (Some(lat), Some(lng)) = (query.lat, query.lng) else {
        return Err(AppError::InvalidData("lat and lng are required".to_string()));
    };

    let couriers = state
        .relay
        .nearby_couriers(
            GeoPoint::new(lat, lng),
            query.radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM),
        )
        .await?;

    Ok(Json(NearbyResponse {
        count: couriers.len(),
        couriers,
    }))
}
