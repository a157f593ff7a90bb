use std::sync::Arc;

use tinymart_core::{DeliveryStore, PurchaseStore, Publisher, TopicRegistry};
use tinymart_proto::{DeliveryUpdatedSerializer, EventSerializer};

use crate::config::ServerConfig;
use crate::mutation::DeliveryService;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TopicRegistry>,
    pub publisher: Publisher,
    pub deliveries: Arc<DeliveryService>,
    /// Payload serializer for every subscription session.
    pub serializer: Arc<dyn EventSerializer>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(TopicRegistry::new());
        let publisher = Publisher::new(Arc::clone(&registry));
        let purchases = Arc::new(PurchaseStore::new());
        let deliveries = Arc::new(DeliveryService::new(
            Arc::new(DeliveryStore::new()),
            Arc::clone(&purchases),
            publisher.clone(),
        ));
        let serializer = DeliveryUpdatedSerializer::new().with_purchases(purchases);

        Self {
            registry,
            publisher,
            deliveries,
            serializer: Arc::new(serializer),
            config: Arc::new(config),
        }
    }
}
