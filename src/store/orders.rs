//! Read/transition access to orders owned by the order service.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::order::{OrderSnapshot, OrderStatus};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Looks an order up by internal id or by human-facing order number.
    async fn find_order(&self, reference: &str) -> Result<Option<OrderSnapshot>, AppError>;

    /// The order the courier is currently carrying, if any.
    async fn active_order_for_courier(
        &self,
        courier_id: &str,
    ) -> Result<Option<OrderSnapshot>, AppError>;

    async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<OrderSnapshot, AppError>;
}

/// Order store kept in process memory, used when the service runs standalone
/// and in tests.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<String, OrderSnapshot>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an order. Order numbers are stored upper-case.
    pub fn insert(&self, mut order: OrderSnapshot) -> OrderSnapshot {
        order.order_number = order.order_number.trim().to_ascii_uppercase();
        self.orders.insert(order.id.clone(), order.clone());
        order
    }

    pub fn get(&self, order_id: &str) -> Option<OrderSnapshot> {
        self.orders.get(order_id).map(|entry| entry.value().clone())
    }

    pub fn assign_courier(
        &self,
        order_id: &str,
        courier_id: &str,
    ) -> Result<OrderSnapshot, AppError> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        order.courier_id = Some(courier_id.to_string());
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Assigned;
        }

        Ok(order.clone())
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

fn progress_rank(status: OrderStatus) -> u8 {
    match status {
        OrderStatus::InTransit => 3,
        OrderStatus::PickedUp => 2,
        OrderStatus::Assigned => 1,
        _ => 0,
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_order(&self, reference: &str) -> Result<Option<OrderSnapshot>, AppError> {
        if let Some(order) = self.get(reference) {
            return Ok(Some(order));
        }

        let order_number = reference.trim().to_ascii_uppercase();
        Ok(self
            .orders
            .iter()
            .find(|entry| entry.value().order_number == order_number)
            .map(|entry| entry.value().clone()))
    }

    async fn active_order_for_courier(
        &self,
        courier_id: &str,
    ) -> Result<Option<OrderSnapshot>, AppError> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.status.is_active() && order.courier_id.as_deref() == Some(courier_id)
            })
            .max_by_key(|entry| progress_rank(entry.value().status))
            .map(|entry| entry.value().clone()))
    }

    async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<OrderSnapshot, AppError> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        order.status = status;
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryOrderStore, OrderStore};
    use crate::models::courier::GeoPoint;
    use crate::models::order::{OrderSnapshot, OrderStatus};

    fn order(
        id: &str,
        number: &str,
        courier: Option<&str>,
        status: OrderStatus,
    ) -> OrderSnapshot {
        OrderSnapshot {
            id: id.to_string(),
            order_number: number.to_string(),
            courier_id: courier.map(str::to_string),
            status,
            pickup: GeoPoint::new(41.0, 29.0),
            delivery: GeoPoint::new(41.1, 29.0),
        }
    }

    #[tokio::test]
    async fn finds_by_id_or_order_number() {
        let store = InMemoryOrderStore::new();
        store.insert(order("o-1", "ab12", None, OrderStatus::Pending));

        assert!(store.find_order("o-1").await.unwrap().is_some());
        let by_number = store.find_order("AB12").await.unwrap().unwrap();
        assert_eq!(by_number.id, "o-1");
        assert!(store.find_order("ab12").await.unwrap().is_some());
        assert!(store.find_order("zz99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn active_order_ignores_finished_orders() {
        let store = InMemoryOrderStore::new();
        store.insert(order("done", "D1", Some("c1"), OrderStatus::Delivered));
        assert!(store.active_order_for_courier("c1").await.unwrap().is_none());

        store.insert(order("live", "L1", Some("c1"), OrderStatus::PickedUp));
        store.insert(order("other", "X1", Some("c2"), OrderStatus::InTransit));
        let active = store.active_order_for_courier("c1").await.unwrap().unwrap();
        assert_eq!(active.id, "live");
    }

    #[tokio::test]
    async fn set_status_on_missing_order_fails() {
        let store = InMemoryOrderStore::new();
        let err = store
            .set_order_status("missing", OrderStatus::InTransit)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ORDER_NOT_FOUND");
    }

    #[test]
    fn assigning_pending_order_marks_it_assigned() {
        let store = InMemoryOrderStore::new();
        store.insert(order("o-1", "N1", None, OrderStatus::Pending));

        let assigned = store.assign_courier("o-1", "c7").unwrap();
        assert_eq!(assigned.courier_id.as_deref(), Some("c7"));
        assert_eq!(assigned.status, OrderStatus::Assigned);
    }
}
