//! Wire messages exchanged with courier and observer sessions.
//!
//! Every frame is `{"event": <name>, "data": {...}}`. Inbound payloads keep
//! their required fields optional so a missing field is reported as
//! `INVALID_DATA` instead of failing to parse the whole frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::courier::{CourierId, CourierStatus, GeoPoint, PositionSample};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "courier:location")]
    ReportPosition(PositionReport),
    #[serde(rename = "courier:start")]
    StartDelivery(StartDeliveryRequest),
    #[serde(rename = "courier:stop")]
    StopDelivery(CourierRef),
    #[serde(rename = "courier:offline")]
    GoOffline(CourierRef),
    #[serde(rename = "customer:track")]
    BeginTracking(TrackRequest),
    #[serde(rename = "customer:untrack")]
    EndTracking(UntrackRequest),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    pub courier_id: Option<CourierId>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    /// Client capture time, milliseconds since the Unix epoch.
    pub timestamp: Option<i64>,
    pub order_id: Option<String>,
}

impl PositionReport {
    /// Validates the report and turns it into a sample, using `now` when the
    /// client sent no usable timestamp.
    pub fn into_sample(self, now: DateTime<Utc>) -> Result<PositionSample, AppError> {
        let (lat, lng) = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => return Err(AppError::InvalidData("lat and lng are required".to_string())),
        };

        let location = GeoPoint::new(lat, lng);
        if !location.is_valid() {
            return Err(AppError::InvalidCoordinates { lat, lng });
        }

        let courier_id = non_empty(self.courier_id)
            .ok_or_else(|| AppError::InvalidData("courierId is required".to_string()))?;

        // Devices report -1 (or NaN) when speed is unknown.
        let speed_mps = self
            .speed
            .filter(|speed| speed.is_finite() && *speed > 0.0)
            .unwrap_or(0.0);

        let captured_at = self
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(now);

        Ok(PositionSample {
            courier_id,
            order_id: non_empty(self.order_id),
            location,
            speed_mps,
            accuracy: self.accuracy.filter(|value| value.is_finite()),
            heading: self.heading.filter(|value| value.is_finite()),
            captured_at,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartDeliveryRequest {
    pub courier_id: Option<CourierId>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourierRef {
    pub courier_id: Option<CourierId>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    /// Internal order id or the human-facing order number.
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UntrackRequest {
    pub courier_id: Option<CourierId>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Ambient broadcast to every connected session.
    #[serde(rename = "courier:update")]
    CourierUpdate(CourierPositionEvent),
    /// Targeted delivery to the sessions tracking one courier.
    #[serde(rename = "courier:location:update")]
    CourierLocationUpdate(CourierPositionEvent),
    #[serde(rename = "courier:status")]
    CourierStatusChanged(CourierStatusEvent),
    #[serde(rename = "courier:found")]
    CourierFound(CourierFound),
    #[serde(rename = "courier:warning")]
    Warning(WarningEvent),
    #[serde(rename = "error")]
    Error(ErrorEvent),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourierPositionEvent {
    pub courier_id: CourierId,
    pub lat: f64,
    pub lng: f64,
    pub speed: f64,
    pub timestamp: i64,
}

impl From<&PositionSample> for CourierPositionEvent {
    fn from(sample: &PositionSample) -> Self {
        Self {
            courier_id: sample.courier_id.clone(),
            lat: sample.location.lat,
            lng: sample.location.lng,
            speed: sample.speed_mps,
            timestamp: sample.captured_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourierStatusEvent {
    pub courier_id: CourierId,
    pub status: CourierStatus,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourierFound {
    pub courier_id: CourierId,
    pub location: GeoPoint,
    pub speed: f64,
    pub eta_minutes: i64,
    pub distance_km: f64,
    pub arrival_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ErrorEvent {
    pub message: String,
    pub code: String,
}

impl From<&AppError> for ErrorEvent {
    fn from(err: &AppError) -> Self {
        Self {
            message: err.public_message(),
            code: err.code().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WarningEvent {
    pub message: String,
    pub code: String,
}

/// Non-fatal problem encountered after a position report was accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportWarning {
    /// The durable log append failed; live updates were still published.
    PersistenceWarning,
    /// The active order could not be resolved; the sample was logged untagged.
    OrderLookupWarning,
}

impl ReportWarning {
    pub fn code(&self) -> &'static str {
        match self {
            ReportWarning::PersistenceWarning => "PERSISTENCE_WARNING",
            ReportWarning::OrderLookupWarning => "ORDER_LOOKUP_WARNING",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReportWarning::PersistenceWarning => "position was relayed but not recorded in history",
            ReportWarning::OrderLookupWarning => "position was relayed but not linked to an order",
        }
    }
}

impl From<ReportWarning> for WarningEvent {
    fn from(warning: ReportWarning) -> Self {
        Self {
            message: warning.message().to_string(),
            code: warning.code().to_string(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn report(lat: f64, lng: f64) -> PositionReport {
        PositionReport {
            courier_id: Some("courier-1".to_string()),
            lat: Some(lat),
            lng: Some(lng),
            ..PositionReport::default()
        }
    }

    #[test]
    fn parses_tagged_courier_location_frame() {
        let frame = json!({
            "event": "courier:location",
            "data": { "courierId": "c-7", "lat": 41.0, "lng": 29.0, "speed": 10.0 }
        });

        let message: ClientMessage = serde_json::from_value(frame).unwrap();
        match message {
            ClientMessage::ReportPosition(report) => {
                assert_eq!(report.courier_id.as_deref(), Some("c-7"));
                assert_eq!(report.speed, Some(10.0));
                assert!(report.timestamp.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let frame = json!({ "event": "courier:teleport", "data": {} });
        assert!(serde_json::from_value::<ClientMessage>(frame).is_err());
    }

    #[test]
    fn out_of_range_latitude_is_invalid_coordinates() {
        let err = report(200.0, 29.0).into_sample(Utc::now()).unwrap_err();
        assert_eq!(err.code(), "INVALID_COORDINATES");
    }

    #[test]
    fn missing_courier_id_is_invalid_data() {
        let mut payload = report(41.0, 29.0);
        payload.courier_id = Some("   ".to_string());
        let err = payload.into_sample(Utc::now()).unwrap_err();
        assert_eq!(err.code(), "INVALID_DATA");
    }

    #[test]
    fn missing_longitude_is_invalid_data() {
        let mut payload = report(41.0, 29.0);
        payload.lng = None;
        assert_eq!(
            payload.into_sample(Utc::now()).unwrap_err().code(),
            "INVALID_DATA"
        );
    }

    #[test]
    fn absent_timestamp_falls_back_to_server_time() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let sample = report(41.0, 29.0).into_sample(now).unwrap();
        assert_eq!(sample.captured_at, now);
        assert_eq!(sample.speed_mps, 0.0);
    }

    #[test]
    fn client_timestamp_and_negative_speed() {
        let mut payload = report(41.0, 29.0);
        payload.timestamp = Some(1_700_000_000_000);
        payload.speed = Some(-1.0);

        let sample = payload.into_sample(Utc::now()).unwrap();
        assert_eq!(sample.captured_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(sample.speed_mps, 0.0);
    }

    #[test]
    fn server_events_serialize_with_event_names() {
        let event = ServerEvent::CourierLocationUpdate(CourierPositionEvent {
            courier_id: "c-1".to_string(),
            lat: 41.0,
            lng: 29.0,
            speed: 3.5,
            timestamp: 42,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "courier:location:update");
        assert_eq!(value["data"]["courierId"], "c-1");
        assert_eq!(value["data"]["timestamp"], 42);
    }

    #[test]
    fn error_event_carries_code() {
        let event = ErrorEvent::from(&AppError::CourierOffline("c-1".to_string()));
        assert_eq!(event.code, "COURIER_OFFLINE");
    }
}
