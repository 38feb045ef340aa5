//! Minimal order registry so the relay can run without the order service.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::GeoPoint;
use crate::models::order::{OrderSnapshot, OrderStatus};
use crate::state::AppState;
use crate::store::orders::OrderStore;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/courier", patch(assign_courier))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub id: Option<String>,
    pub order_number: Option<String>,
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
    pub courier_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignCourierRequest {
    pub courier_id: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<OrderSnapshot>, AppError> {
    for (field, point) in [("pickup", &payload.pickup), ("delivery", &payload.delivery)] {
        if !point.is_valid() {
            return Err(AppError::BadRequest(format!("{field} coordinates out of range")));
        }
    }

    let id = payload
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if state.orders.get(&id).is_some() {
        return Err(AppError::BadRequest(format!("order {id} already exists")));
    }

    let order_number = payload
        .order_number
        .filter(|number| !number.trim().is_empty())
        .unwrap_or_else(|| {
            id.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(8)
                .collect()
        });
    let courier_id = payload.courier_id.filter(|id| !id.trim().is_empty());
    let status = if courier_id.is_some() {
        OrderStatus::Assigned
    } else {
        OrderStatus::Pending
    };

    let order = state.orders.insert(OrderSnapshot {
        id,
        order_number,
        courier_id,
        status,
        pickup: payload.pickup,
        delivery: payload.delivery,
    });

    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderSnapshot>, AppError> {
    let order = state
        .orders
        .find_order(&id)
        .await?
        .ok_or_else(|| AppError::OrderNotFound(id.clone()))?;

    Ok(Json(order))
}

async fn assign_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AssignCourierRequest>,
) -> Result<Json<OrderSnapshot>, AppError> {
    if payload.courier_id.trim().is_empty() {
        return Err(AppError::InvalidData("courierId cannot be empty".to_string()));
    }

    Ok(Json(state.orders.assign_courier(&id, payload.courier_id.trim())?))
}
