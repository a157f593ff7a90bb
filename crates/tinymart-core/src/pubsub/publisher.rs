//! Publisher called from the write path.

use std::sync::Arc;

use tinymart_proto::DeliveryEvent;

use super::key::CorrelationKey;
use super::registry::TopicRegistry;

/// Pushes domain events to the subscribers interested in them.
///
/// Cheap to clone. Publishing never blocks and never fails: subscribers with a
/// full or closed channel miss the event.
#[derive(Clone)]
pub struct Publisher {
    registry: Arc<TopicRegistry>,
}

impl Publisher {
    /// Create a publisher over a shared registry.
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self { registry }
    }

    /// Publish `event` under its purchase id and to wildcard subscribers.
    ///
    /// Call this right after the write that produced the event succeeds so
    /// subscribers see updates in write order.
    pub fn publish_domain_event(&self, event: DeliveryEvent) {
        let key = CorrelationKey::for_event(&event);
        let delivery_id = event.delivery_id;
        let report = self.registry.publish(&key, &Arc::new(event));

        tracing::debug!(
            key = %key,
            delivery_id,
            delivered = report.delivered,
            dropped = report.dropped,
            "published delivery event"
        );
    }

    /// The registry this publisher fans out through.
    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }
}
