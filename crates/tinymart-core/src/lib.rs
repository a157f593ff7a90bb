//! tinymart core.
//!
//! In-process fan-out of delivery status changes:
//!
//! - [`pubsub`] - topic registry keyed by correlation key, bounded subscriber
//!   channels, and the publisher called from the write path
//! - [`store`] - in-memory delivery and purchase records used by the write path
//! - [`error`] - core error types

pub mod error;
pub mod pubsub;
pub mod store;

pub use error::Error;
pub use pubsub::{
    channel, CorrelationKey, EventSender, PublishReport, Publisher, SharedEvent,
    SubscriberChannel, SubscriberId, TopicRegistry,
};
pub use store::{DeliveryFilter, DeliveryStore, PurchaseStore};
