//! Orchestrates position reports, courier status transitions and observer
//! tracking on top of the stores and the session registry.

pub mod dispatch;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::eta::estimate_eta;
use crate::models::courier::{CourierId, CourierState, CourierStatus, GeoPoint, NearbyCourier};
use crate::models::events::{
    CourierFound, CourierPositionEvent, CourierStatusEvent, PositionReport, ReportWarning,
    ServerEvent,
};
use crate::models::order::OrderStatus;
use crate::observability::metrics::Metrics;
use crate::registry::{SessionId, SessionRegistry};
use crate::store::directory::CourierDirectory;
use crate::store::ephemeral::EphemeralPositionStore;
use crate::store::log::{MAX_HISTORY_LIMIT, PositionLog, PositionRecord};
use crate::store::orders::OrderStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub courier_id: CourierId,
    /// Order the history record was tagged with.
    pub order_id: Option<String>,
    pub record_id: Option<Uuid>,
    /// Observer sessions that received the room-scoped update.
    pub observers_notified: usize,
    pub warnings: Vec<ReportWarning>,
}

pub struct LocationRelay {
    positions: Arc<EphemeralPositionStore>,
    history: Arc<dyn PositionLog>,
    orders: Arc<dyn OrderStore>,
    directory: Arc<dyn CourierDirectory>,
    sessions: Arc<SessionRegistry>,
    metrics: Metrics,
}

impl LocationRelay {
    pub fn new(
        positions: Arc<EphemeralPositionStore>,
        history: Arc<dyn PositionLog>,
        orders: Arc<dyn OrderStore>,
        directory: Arc<dyn CourierDirectory>,
        sessions: Arc<SessionRegistry>,
        metrics: Metrics,
    ) -> Self {
        Self {
            positions,
            history,
            orders,
            directory,
            sessions,
            metrics,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Accepts one courier fix.
    ///
    /// Validation failures reject the report before anything is written.
    /// Once accepted, the live store is updated and both broadcasts go out
    /// before the history append; a failed append or order lookup becomes a
    /// warning on the outcome.
    pub async fn report_position(
        &self,
        report: PositionReport,
    ) -> Result<ReportOutcome, AppError> {
        let started = Instant::now();

        let sample = match report.into_sample(Utc::now()) {
            Ok(sample) => sample,
            Err(err) => {
                self.metrics
                    .position_reports_total
                    .with_label_values(&["rejected"])
                    .inc();
                debug!(error = %err, "position report rejected");
                return Err(err);
            }
        };

        self.positions.upsert(&sample);

        let update = CourierPositionEvent::from(&sample);
        self.sessions
            .publish_global(ServerEvent::CourierUpdate(update.clone()));
        let observers_notified = self.sessions.publish_to_room(
            &sample.courier_id,
            ServerEvent::CourierLocationUpdate(update),
        );

        let mut warnings = Vec::new();

        let order_id = match self.orders.active_order_for_courier(&sample.courier_id).await {
            Ok(Some(order)) => Some(order.id),
            Ok(None) => sample.order_id.clone(),
            Err(err) => {
                warn!(
                    courier_id = %sample.courier_id,
                    error = %err,
                    "active order lookup failed; logging position untagged"
                );
                warnings.push(ReportWarning::OrderLookupWarning);
                sample.order_id.clone()
            }
        };

        let record = PositionRecord::from_sample(&sample, order_id.clone());
        let record_id = match self.history.append(record).await {
            Ok(id) => Some(id),
            Err(err) => {
                self.metrics.position_log_failures_total.inc();
                warn!(
                    courier_id = %sample.courier_id,
                    error = %err,
                    "position history append failed"
                );
                warnings.push(ReportWarning::PersistenceWarning);
                None
            }
        };

        let outcome = if warnings.is_empty() { "accepted" } else { "degraded" };
        self.metrics
            .position_reports_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .report_latency_seconds
            .observe(started.elapsed().as_secs_f64());

        debug!(
            courier_id = %sample.courier_id,
            lat = sample.location.lat,
            lng = sample.location.lng,
            speed = sample.speed_mps,
            observers = observers_notified,
            "position relayed"
        );

        Ok(ReportOutcome {
            courier_id: sample.courier_id,
            order_id,
            record_id,
            observers_notified,
            warnings,
        })
    }

    /// Marks the courier active and, when an order is given, moves that
    /// order in transit. The order is updated first so a failure leaves the
    /// courier's status untouched.
    pub async fn start_delivery(
        &self,
        courier_id: Option<&str>,
        order_id: Option<&str>,
    ) -> Result<CourierStatusEvent, AppError> {
        let courier_id = required_courier(courier_id)?;

        if let Some(reference) = order_id.map(str::trim).filter(|id| !id.is_empty()) {
            let order = self
                .orders
                .find_order(reference)
                .await?
                .ok_or_else(|| AppError::OrderNotFound(reference.to_string()))?;

            if let Some(assigned) = order.courier_id.as_deref() {
                if assigned != courier_id {
                    return Err(AppError::BadRequest(format!(
                        "order {} is assigned to another courier",
                        order.id
                    )));
                }
            }

            self.orders
                .set_order_status(&order.id, OrderStatus::InTransit)
                .await?;
            info!(courier_id = %courier_id, order_id = %order.id, "order in transit");
        }

        Ok(self.transition(courier_id, CourierStatus::Active))
    }

    pub async fn stop_delivery(
        &self,
        courier_id: Option<&str>,
    ) -> Result<CourierStatusEvent, AppError> {
        let courier_id = required_courier(courier_id)?;
        Ok(self.transition(courier_id, CourierStatus::Idle))
    }

    /// Logout path: forgets the courier's live position.
    pub async fn go_offline(
        &self,
        courier_id: Option<&str>,
    ) -> Result<CourierStatusEvent, AppError> {
        let courier_id = required_courier(courier_id)?;
        Ok(self.transition(courier_id, CourierStatus::Offline))
    }

    fn transition(&self, courier_id: &str, status: CourierStatus) -> CourierStatusEvent {
        self.positions.set_status(courier_id, status);

        let event = CourierStatusEvent {
            courier_id: courier_id.to_string(),
            status,
            timestamp: Utc::now().timestamp_millis(),
        };
        self.sessions
            .publish_global(ServerEvent::CourierStatusChanged(event.clone()));

        info!(courier_id = %courier_id, status = status.as_str(), "courier status changed");
        event
    }

    /// Resolves the order's courier, computes the ETA to the delivery point
    /// and subscribes the session to that courier's room. The room is joined
    /// only after every check has passed.
    pub async fn begin_tracking(
        &self,
        session_id: SessionId,
        order_ref: Option<&str>,
    ) -> Result<CourierFound, AppError> {
        let result = self.try_begin_tracking(session_id, order_ref).await;

        let outcome = match &result {
            Ok(_) => "found",
            Err(err) => err.code(),
        };
        self.metrics
            .tracking_requests_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    async fn try_begin_tracking(
        &self,
        session_id: SessionId,
        order_ref: Option<&str>,
    ) -> Result<CourierFound, AppError> {
        let reference = order_ref
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .ok_or(AppError::OrderIdRequired)?;

        let order = self
            .orders
            .find_order(reference)
            .await
            .map_err(|err| {
                error!(
                    order_ref = %reference,
                    error = %err,
                    "order lookup failed during tracking"
                );
                AppError::TrackFailed
            })?
            .ok_or_else(|| AppError::OrderNotFound(reference.to_string()))?;

        let courier_id = order
            .courier_id
            .clone()
            .ok_or_else(|| AppError::NoCourierAssigned(order.id.clone()))?;

        let state = self
            .positions
            .get(&courier_id)
            .ok_or_else(|| AppError::CourierOffline(courier_id.clone()))?;
        let location = state
            .location
            .ok_or_else(|| AppError::CourierOffline(courier_id.clone()))?;

        let eta = estimate_eta(&location, &order.delivery, state.speed_mps, Utc::now());

        if !self.sessions.join(session_id, &courier_id) {
            debug!(session_id = %session_id, "session gone before room join");
            return Err(AppError::TrackFailed);
        }

        info!(
            session_id = %session_id,
            order_id = %order.id,
            courier_id = %courier_id,
            distance_km = eta.distance_km,
            eta_minutes = eta.minutes,
            "tracking started"
        );

        Ok(CourierFound {
            courier_id,
            location,
            speed: state.speed_mps,
            eta_minutes: eta.minutes,
            distance_km: eta.distance_km,
            arrival_at: eta.arrival_at,
        })
    }

    pub fn end_tracking(&self, session_id: SessionId, courier_id: Option<&str>) -> bool {
        let Some(courier_id) = courier_id else {
            return false;
        };

        let left = self.sessions.leave(session_id, courier_id);
        if left {
            info!(session_id = %session_id, courier_id = %courier_id, "tracking ended");
        }
        left
    }

    pub fn disconnect(&self, session_id: SessionId) {
        self.sessions.disconnect(session_id);
    }

    pub fn current_position(&self, courier_id: &str) -> Result<CourierState, AppError> {
        self.positions.get(courier_id).ok_or_else(|| {
            AppError::NotFound(format!("no live position for courier {courier_id}"))
        })
    }

    /// Available couriers with a fresh fix within `radius_km`, nearest first.
    pub async fn nearby_couriers(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyCourier>, AppError> {
        if !center.is_valid() {
            return Err(AppError::InvalidCoordinates {
                lat: center.lat,
                lng: center.lng,
            });
        }
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AppError::BadRequest("radius must be > 0".to_string()));
        }

        let mut available = Vec::new();
        for courier in self.positions.find_within_radius(&center, radius_km) {
            if self.directory.is_available(&courier.courier_id).await? {
                available.push(courier);
            }
        }

        Ok(available)
    }

    pub async fn history(
        &self,
        courier_id: &str,
        order_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, AppError> {
        self.history
            .query_by_courier(courier_id, order_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }

    pub async fn latest_recorded(&self, courier_id: &str) -> Result<PositionRecord, AppError> {
        self.history
            .latest_for_courier(courier_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no recorded position for courier {courier_id}"))
            })
    }
}

fn required_courier(courier_id: Option<&str>) -> Result<&str, AppError> {
    courier_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidData("courierId is required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::required_courier;

    #[test]
    fn blank_courier_id_is_invalid_data() {
        assert_eq!(required_courier(Some("  ")).unwrap_err().code(), "INVALID_DATA");
        assert_eq!(required_courier(None).unwrap_err().code(), "INVALID_DATA");
        assert_eq!(required_courier(Some(" c1 ")).unwrap(), "c1");
    }
}
