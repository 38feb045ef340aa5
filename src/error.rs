use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid coordinates: lat={lat}, lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("order id is required")]
    OrderIdRequired,

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {0} has no courier assigned")]
    NoCourierAssigned(String),

    #[error("courier {0} has no live position")]
    CourierOffline(String),

    #[error("tracking could not be started")]
    TrackFailed,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable wire code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::InvalidData(_) => "INVALID_DATA",
            AppError::InvalidCoordinates { .. } => "INVALID_COORDINATES",
            AppError::OrderIdRequired => "ORDER_ID_REQUIRED",
            AppError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            AppError::NoCourierAssigned(_) => "NO_COURIER_ASSIGNED",
            AppError::CourierOffline(_) => "COURIER_OFFLINE",
            AppError::TrackFailed => "TRACK_FAILED",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show an end user. Storage and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Storage(_) | AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::InvalidData(_)
            | AppError::InvalidCoordinates { .. }
            | AppError::OrderIdRequired => StatusCode::BAD_REQUEST,
            AppError::NoCourierAssigned(_) | AppError::CourierOffline(_) => StatusCode::CONFLICT,
            AppError::TrackFailed | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.public_message(),
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}
