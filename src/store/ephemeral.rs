//! Latest-known courier positions with a freshness window.
//!
//! Entries are keyed by courier id in a sharded map, so writes for one
//! courier never contend with another's. Expiry is applied lazily on every
//! read and eagerly by [`run_expiry_sweeper`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::geo::{haversine_km, round_km};
use crate::models::courier::{
    CourierId, CourierState, CourierStatus, GeoPoint, NearbyCourier, PositionSample,
};
use crate::observability::metrics::Metrics;

pub struct EphemeralPositionStore {
    entries: DashMap<CourierId, CourierState>,
    ttl: TimeDelta,
}

impl EphemeralPositionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::hours(1)),
        }
    }

    pub fn upsert(&self, sample: &PositionSample) -> CourierState {
        self.upsert_at(sample, Utc::now())
    }

    /// Replaces the courier's snapshot with `sample`. Optional fields the
    /// sample omits are stored as zero, and the courier becomes active.
    pub fn upsert_at(&self, sample: &PositionSample, now: DateTime<Utc>) -> CourierState {
        let state = CourierState {
            courier_id: sample.courier_id.clone(),
            location: Some(sample.location),
            speed_mps: sample.speed_mps,
            accuracy: sample.accuracy.unwrap_or(0.0),
            heading: sample.heading.unwrap_or(0.0),
            captured_at: Some(sample.captured_at),
            last_write_at: now,
            status: CourierStatus::Active,
        };

        self.entries.insert(state.courier_id.clone(), state.clone());
        state
    }

    pub fn get(&self, courier_id: &str) -> Option<CourierState> {
        self.get_at(courier_id, Utc::now())
    }

    pub fn get_at(&self, courier_id: &str, now: DateTime<Utc>) -> Option<CourierState> {
        let state = self.entries.get(courier_id).map(|entry| entry.value().clone())?;

        if self.is_expired(&state, now) {
            self.entries
                .remove_if(courier_id, |_, current| self.is_expired(current, now));
            return None;
        }

        Some(state)
    }

    pub fn set_status(&self, courier_id: &str, status: CourierStatus) -> Option<CourierState> {
        self.set_status_at(courier_id, status, Utc::now())
    }

    /// Applies a status transition. `Offline` deletes the entry and returns
    /// `None`; other statuses create a position-less entry when the courier
    /// has no fresh snapshot. A status change never extends the TTL of a
    /// stored fix.
    pub fn set_status_at(
        &self,
        courier_id: &str,
        status: CourierStatus,
        now: DateTime<Utc>,
    ) -> Option<CourierState> {
        if status == CourierStatus::Offline {
            self.entries.remove(courier_id);
            return None;
        }

        let mut entry = self
            .entries
            .entry(courier_id.to_string())
            .or_insert_with(|| status_only(courier_id, status, now));

        if self.is_expired(&entry, now) {
            *entry = status_only(courier_id, status, now);
        } else {
            entry.status = status;
            // A fix ages from its own write; only position-less entries are refreshed.
            if entry.location.is_none() {
                entry.last_write_at = now;
            }
        }

        Some(entry.clone())
    }

    /// Couriers with a fresh position within `radius_km` of `center`,
    /// nearest first.
    pub fn find_within_radius(&self, center: &GeoPoint, radius_km: f64) -> Vec<NearbyCourier> {
        self.find_within_radius_at(center, radius_km, Utc::now())
    }

    pub fn find_within_radius_at(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        now: DateTime<Utc>,
    ) -> Vec<NearbyCourier> {
        let mut nearby: Vec<NearbyCourier> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let state = entry.value();
                if self.is_expired(state, now) {
                    return None;
                }

                let location = state.location?;
                let distance_km = haversine_km(center, &location);
                if distance_km > radius_km {
                    return None;
                }

                Some(NearbyCourier {
                    courier_id: state.courier_id.clone(),
                    location,
                    speed_mps: state.speed_mps,
                    distance_km,
                    status: state.status,
                })
            })
            .collect();

        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        for courier in &mut nearby {
            courier.distance_km = round_km(courier.distance_km);
        }
        nearby
    }

    /// Drops every entry older than the TTL, returning how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, state| !self.is_expired(state, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, state: &CourierState, now: DateTime<Utc>) -> bool {
        now - state.last_write_at >= self.ttl
    }
}

fn status_only(courier_id: &str, status: CourierStatus, now: DateTime<Utc>) -> CourierState {
    CourierState {
        courier_id: courier_id.to_string(),
        location: None,
        speed_mps: 0.0,
        accuracy: 0.0,
        heading: 0.0,
        captured_at: None,
        last_write_at: now,
        status,
    }
}

pub async fn run_expiry_sweeper(
    store: Arc<EphemeralPositionStore>,
    metrics: Metrics,
    interval: Duration,
) {
    info!(interval_secs = interval.as_secs(), "position expiry sweeper started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let purged = store.purge_expired(Utc::now());
        if purged > 0 {
            debug!(purged, "expired courier positions purged");
        }
        metrics.live_couriers.set(store.len() as i64);
    }
}
