use std::sync::Arc;

use crate::config::Config;
use crate::observability::metrics::Metrics;
use crate::registry::SessionRegistry;
use crate::relay::LocationRelay;
use crate::store::directory::InMemoryCourierDirectory;
use crate::store::ephemeral::EphemeralPositionStore;
use crate::store::log::{InMemoryPositionLog, PositionLog};
use crate::store::orders::InMemoryOrderStore;

pub struct AppState {
    pub relay: Arc<LocationRelay>,
    pub registry: Arc<SessionRegistry>,
    pub positions: Arc<EphemeralPositionStore>,
    pub orders: Arc<InMemoryOrderStore>,
    pub directory: Arc<InMemoryCourierDirectory>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_position_log(config, Arc::new(InMemoryPositionLog::new()))
    }

    pub fn with_position_log(config: &Config, history: Arc<dyn PositionLog>) -> Self {
        let metrics = Metrics::new();
        let positions = Arc::new(EphemeralPositionStore::new(config.position_ttl));
        let registry = Arc::new(SessionRegistry::new(
            config.session_buffer_size,
            metrics.clone(),
        ));
        let orders = Arc::new(InMemoryOrderStore::new());
        let directory = Arc::new(InMemoryCourierDirectory::new());

        let relay = Arc::new(LocationRelay::new(
            positions.clone(),
            history,
            orders.clone(),
            directory.clone(),
            registry.clone(),
            metrics.clone(),
        ));

        Self {
            relay,
            registry,
            positions,
            orders,
            directory,
            metrics,
        }
    }
}
