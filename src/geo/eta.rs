use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::geo::{haversine_km, round_km};
use crate::models::courier::GeoPoint;

/// Assumed cruising speed when the courier reports no movement.
pub const DEFAULT_SPEED_KMH: f64 = 25.0;

/// Upper bound on a reported ETA, one week. Near-zero speeds would otherwise
/// overflow the arrival time.
pub const MAX_ETA_MINUTES: i64 = 7 * 24 * 60;

const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtaEstimate {
    pub distance_km: f64,
    pub minutes: i64,
    pub arrival_at: DateTime<Utc>,
}

pub fn effective_speed_kmh(speed_mps: f64) -> f64 {
    if speed_mps.is_finite() && speed_mps > 0.0 {
        speed_mps * MPS_TO_KMH
    } else {
        DEFAULT_SPEED_KMH
    }
}

/// Straight-line arrival estimate from the courier's position to `target`.
///
/// The reported distance is rounded to two decimals; minutes are computed
/// from the unrounded distance and stay within `1..=MAX_ETA_MINUTES`.
pub fn estimate_eta(
    courier: &GeoPoint,
    target: &GeoPoint,
    speed_mps: f64,
    now: DateTime<Utc>,
) -> EtaEstimate {
    let distance_km = haversine_km(courier, target);
    let hours = distance_km / effective_speed_kmh(speed_mps);
    let minutes = ((hours * 60.0)
        .round()
        .min(MAX_ETA_MINUTES as f64) as i64)
        .max(1);
    let arrival_at = TimeDelta::try_minutes(minutes)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now);

    EtaEstimate {
        distance_km: round_km(distance_km),
        minutes,
        arrival_at,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{effective_speed_kmh, estimate_eta, DEFAULT_SPEED_KMH, MAX_ETA_MINUTES};
    use crate::models::courier::GeoPoint;

    fn north_of(origin: GeoPoint, km: f64) -> GeoPoint {
        GeoPoint::new(origin.lat + (km / 6_371.0).to_degrees(), origin.lng)
    }

    #[test]
    fn zero_speed_uses_default_cruising_speed() {
        let origin = GeoPoint::new(41.0, 29.0);
        let target = north_of(origin, 12.5);

        let eta = estimate_eta(&origin, &target, 0.0, Utc::now());
        assert_eq!(eta.minutes, 30);
        assert_eq!(eta.distance_km, 12.5);
    }

    #[test]
    fn reported_speed_is_converted_to_kmh() {
        assert_eq!(effective_speed_kmh(10.0), 36.0);
        assert_eq!(effective_speed_kmh(0.0), DEFAULT_SPEED_KMH);
        assert_eq!(effective_speed_kmh(f64::NAN), DEFAULT_SPEED_KMH);
    }

    #[test]
    fn minutes_never_below_one() {
        let here = GeoPoint::new(52.52, 13.405);
        let eta = estimate_eta(&here, &here, 0.0, Utc::now());
        assert_eq!(eta.minutes, 1);
        assert_eq!(eta.distance_km, 0.0);

        let next_door = north_of(here, 0.05);
        assert_eq!(estimate_eta(&here, &next_door, 30.0, Utc::now()).minutes, 1);
    }

    #[test]
    fn arrival_is_now_plus_minutes() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap();
        let origin = GeoPoint::new(41.0, 29.0);
        let target = GeoPoint::new(41.1, 29.0);

        let eta = estimate_eta(&origin, &target, 10.0, now);
        assert_eq!(eta.distance_km, 11.12);
        assert_eq!(eta.minutes, 19);
        assert_eq!(eta.arrival_at, now + Duration::minutes(19));
    }

    #[test]
    fn crawling_speed_is_capped_instead_of_overflowing() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap();
        let origin = GeoPoint::new(41.0, 29.0);
        let target = GeoPoint::new(41.1, 29.0);

        for speed in [1e-9, f64::MIN_POSITIVE] {
            let eta = estimate_eta(&origin, &target, speed, now);
            assert_eq!(eta.minutes, MAX_ETA_MINUTES);
            assert_eq!(eta.distance_km, 11.12);
            assert_eq!(eta.arrival_at, now + Duration::days(7));
        }
    }
}
