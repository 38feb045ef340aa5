use serde::{Deserialize, Serialize};

use crate::models::courier::{CourierId, GeoPoint};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Statuses during which the courier's positions belong to the order.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::InTransit
        )
    }
}

/// The slice of an order the relay reads from the order store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub id: String,
    pub order_number: String,
    pub courier_id: Option<CourierId>,
    pub status: OrderStatus,
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus;

    #[test]
    fn only_in_flight_statuses_are_active() {
        assert!(OrderStatus::Assigned.is_active());
        assert!(OrderStatus::PickedUp.is_active());
        assert!(OrderStatus::InTransit.is_active());
        assert!(!OrderStatus::Pending.is_active());
        assert!(!OrderStatus::Delivered.is_active());
        assert!(!OrderStatus::Cancelled.is_active());
    }
}
