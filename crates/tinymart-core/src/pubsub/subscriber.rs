//! Bounded subscriber channels.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use tinymart_proto::DeliveryEvent;

/// Event shared by every subscriber it is delivered to.
pub type SharedEvent = Arc<DeliveryEvent>;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a subscriber channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Sent,
    Full,
    Closed,
}

/// Sending half of a subscriber channel, held by the registry.
#[derive(Debug, Clone)]
pub struct EventSender {
    id: SubscriberId,
    tx: mpsc::Sender<SharedEvent>,
}

impl EventSender {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the receiving half has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Enqueue without waiting. A full queue rejects the new event, so the
    /// subscriber keeps the oldest undelivered events.
    pub(crate) fn try_enqueue(&self, event: &SharedEvent) -> Enqueue {
        match self.tx.try_send(Arc::clone(event)) {
            Ok(()) => Enqueue::Sent,
            Err(TrySendError::Full(_)) => Enqueue::Full,
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }
}

/// Receiving half of a subscriber channel, owned by one subscription.
#[derive(Debug)]
pub struct SubscriberChannel {
    id: SubscriberId,
    rx: mpsc::Receiver<SharedEvent>,
}

impl SubscriberChannel {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<SharedEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<SharedEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting events. Already queued events can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a subscriber channel holding at most `capacity` events.
///
/// A zero capacity is raised to one.
pub fn channel(capacity: usize) -> (EventSender, SubscriberChannel) {
    let id = SubscriberId::next();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { id, tx }, SubscriberChannel { id, rx })
}
