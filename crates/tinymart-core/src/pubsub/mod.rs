//! Pub-sub fan-out of delivery events.
//!
//! Subscribers own a bounded [`SubscriberChannel`] and register its sending
//! half with the [`TopicRegistry`] under a [`CorrelationKey`]. The
//! [`Publisher`] is called from the write path and enqueues each event on
//! every matching channel without blocking. A full or closed channel drops
//! the event for that subscriber only.

mod key;
mod publisher;
mod registry;
mod subscriber;

pub use key::CorrelationKey;
pub use publisher::Publisher;
pub use registry::{PublishReport, TopicRegistry};
pub use subscriber::{channel, EventSender, SharedEvent, SubscriberChannel, SubscriberId};
