//! Courier availability as maintained by the user service.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::courier::CourierId;

#[async_trait]
pub trait CourierDirectory: Send + Sync {
    async fn is_available(&self, courier_id: &str) -> Result<bool, AppError>;
}

/// Couriers are available until explicitly marked otherwise.
#[derive(Default)]
pub struct InMemoryCourierDirectory {
    availability: DashMap<CourierId, bool>,
}

impl InMemoryCourierDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_availability(&self, courier_id: &str, available: bool) {
        self.availability.insert(courier_id.to_string(), available);
    }
}

#[async_trait]
impl CourierDirectory for InMemoryCourierDirectory {
    async fn is_available(&self, courier_id: &str) -> Result<bool, AppError> {
        Ok(self
            .availability
            .get(courier_id)
            .map(|entry| *entry.value())
            .unwrap_or(true))
    }
}

#[cfg(test)]
mod tests {
    use super::{CourierDirectory, InMemoryCourierDirectory};

    #[tokio::test]
    async fn unknown_couriers_default_to_available() {
        let directory = InMemoryCourierDirectory::new();
        assert!(directory.is_available("c1").await.unwrap());

        directory.set_availability("c1", false);
        assert!(!directory.is_available("c1").await.unwrap());
    }
}
