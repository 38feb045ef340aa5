//! Append-only history of every accepted position report.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{CourierId, GeoPoint, PositionSample};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub id: Uuid,
    pub courier_id: CourierId,
    pub order_id: Option<String>,
    pub location: GeoPoint,
    pub speed_mps: f64,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub captured_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl PositionRecord {
    /// Builds the record for `sample`, tagged with the resolved order.
    pub fn from_sample(sample: &PositionSample, order_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            courier_id: sample.courier_id.clone(),
            order_id,
            location: sample.location,
            speed_mps: sample.speed_mps,
            accuracy: sample.accuracy,
            heading: sample.heading,
            captured_at: sample.captured_at,
            recorded_at: Utc::now(),
        }
    }
}

/// Durable storage for position history.
///
/// There is no update or delete: retention is handled outside this service.
#[async_trait]
pub trait PositionLog: Send + Sync {
    async fn append(&self, record: PositionRecord) -> Result<Uuid, AppError>;

    /// Most recent first, at most `limit` records.
    async fn query_by_courier(
        &self,
        courier_id: &str,
        order_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, AppError>;

    async fn latest_for_courier(
        &self,
        courier_id: &str,
    ) -> Result<Option<PositionRecord>, AppError>;
}

/// Process-local log, one append-only vector per courier.
#[derive(Default)]
pub struct InMemoryPositionLog {
    records: DashMap<CourierId, Vec<PositionRecord>>,
}

impl InMemoryPositionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PositionLog for InMemoryPositionLog {
    async fn append(&self, record: PositionRecord) -> Result<Uuid, AppError> {
        let id = record.id;
        self.records
            .entry(record.courier_id.clone())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn query_by_courier(
        &self,
        courier_id: &str,
        order_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, AppError> {
        let Some(records) = self.records.get(courier_id) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<PositionRecord> = records
            .iter()
            .filter(|record| {
                order_id.is_none_or(|wanted| record.order_id.as_deref() == Some(wanted))
            })
            .cloned()
            .collect();
        drop(records);

        // Stable sort keeps arrival order among equal capture times.
        matching.reverse();
        matching.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn latest_for_courier(
        &self,
        courier_id: &str,
    ) -> Result<Option<PositionRecord>, AppError> {
        Ok(self
            .query_by_courier(courier_id, None, 1)
            .await?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::{InMemoryPositionLog, PositionLog, PositionRecord};
    use crate::models::courier::{GeoPoint, PositionSample};

    fn record(courier_id: &str, order_id: Option<&str>, minutes_ago: i64) -> PositionRecord {
        let sample = PositionSample {
            courier_id: courier_id.to_string(),
            order_id: None,
            location: GeoPoint::new(41.0, 29.0 + minutes_ago as f64 * 0.001),
            speed_mps: 5.0,
            accuracy: Some(8.0),
            heading: None,
            captured_at: Utc::now() - TimeDelta::minutes(minutes_ago),
        };
        PositionRecord::from_sample(&sample, order_id.map(str::to_string))
    }

    #[tokio::test]
    async fn query_returns_most_recent_first() {
        let log = InMemoryPositionLog::new();
        log.append(record("c1", None, 10)).await.unwrap();
        log.append(record("c1", None, 1)).await.unwrap();
        log.append(record("c1", None, 5)).await.unwrap();

        let history = log.query_by_courier("c1", None, 10).await.unwrap();
        let ages: Vec<f64> = history
            .iter()
            .map(|r| ((r.location.lng - 29.0) * 1000.0).round())
            .collect();
        assert_eq!(ages, vec![1.0, 5.0, 10.0]);
    }

    #[tokio::test]
    async fn query_filters_by_order_and_limit() {
        let log = InMemoryPositionLog::new();
        log.append(record("c1", Some("o1"), 3)).await.unwrap();
        log.append(record("c1", Some("o2"), 2)).await.unwrap();
        log.append(record("c1", Some("o1"), 1)).await.unwrap();
        log.append(record("c2", Some("o1"), 0)).await.unwrap();

        let for_order = log.query_by_courier("c1", Some("o1"), 10).await.unwrap();
        assert_eq!(for_order.len(), 2);
        assert!(for_order.iter().all(|r| r.order_id.as_deref() == Some("o1")));

        let limited = log.query_by_courier("c1", None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].order_id.as_deref(), Some("o1"));
    }

    #[tokio::test]
    async fn latest_for_unknown_courier_is_none() {
        let log = InMemoryPositionLog::new();
        assert!(log.latest_for_courier("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_returns_newest_capture() {
        let log = InMemoryPositionLog::new();
        log.append(record("c1", None, 7)).await.unwrap();
        let newest = record("c1", None, 0);
        let newest_id = newest.id;
        log.append(newest).await.unwrap();

        let latest = log.latest_for_courier("c1").await.unwrap().unwrap();
        assert_eq!(latest.id, newest_id);
        assert_eq!(log.len(), 2);
    }
}
