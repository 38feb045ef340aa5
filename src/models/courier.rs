use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CourierId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Latitude in [-90, 90] and longitude in [-180, 180]; NaN is never valid.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourierStatus {
    Active,
    Idle,
    Offline,
}

impl CourierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourierStatus::Active => "active",
            CourierStatus::Idle => "idle",
            CourierStatus::Offline => "offline",
        }
    }
}

/// One validated position fix reported by a courier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub courier_id: CourierId,
    pub order_id: Option<String>,
    pub location: GeoPoint,
    pub speed_mps: f64,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// Latest known snapshot of a courier, as held by the ephemeral store.
///
/// `location` is `None` when the courier changed status without ever
/// reporting a fix; such a courier is not trackable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourierState {
    pub courier_id: CourierId,
    pub location: Option<GeoPoint>,
    pub speed_mps: f64,
    pub accuracy: f64,
    pub heading: f64,
    pub captured_at: Option<DateTime<Utc>>,
    pub last_write_at: DateTime<Utc>,
    pub status: CourierStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NearbyCourier {
    pub courier_id: CourierId,
    pub location: GeoPoint,
    pub speed_mps: f64,
    pub distance_km: f64,
    pub status: CourierStatus,
}

#[cfg(test)]
mod tests {
    use super::GeoPoint;

    #[test]
    fn coordinate_bounds_are_inclusive() {
        assert!(GeoPoint::new(90.0, 180.0).is_valid());
        assert!(GeoPoint::new(-90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.0001, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }
}
