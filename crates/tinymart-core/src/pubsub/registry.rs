//! Topic registry mapping correlation keys to live subscriber channels.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::key::CorrelationKey;
use super::subscriber::{Enqueue, EventSender, SharedEvent, SubscriberId};

/// Result of fanning one event out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Channels that accepted the event.
    pub delivered: usize,
    /// Channels that were full or closed.
    pub dropped: usize,
}

impl PublishReport {
    fn record(&mut self, outcome: Enqueue) {
        match outcome {
            Enqueue::Sent => self.delivered += 1,
            Enqueue::Full | Enqueue::Closed => self.dropped += 1,
        }
    }
}

#[derive(Default)]
struct Topics {
    /// Channels per key. A key is present only while its set is non-empty.
    by_key: HashMap<CorrelationKey, HashMap<SubscriberId, EventSender>>,
    /// Reverse index so a channel lives under one key at a time.
    key_of: HashMap<SubscriberId, CorrelationKey>,
}

impl Topics {
    fn remove(&mut self, key: &CorrelationKey, id: SubscriberId) -> bool {
        let Some(set) = self.by_key.get_mut(key) else {
            return false;
        };
        let removed = set.remove(&id).is_some();
        if set.is_empty() {
            self.by_key.remove(key);
        }
        if removed {
            self.key_of.remove(&id);
        }
        removed
    }
}

/// Registry of subscriber channels keyed by correlation key.
///
/// One reader/writer lock guards the whole map, so a publish never observes a
/// half-applied register or unregister. Enqueueing is non-blocking, so the
/// read lock is never held across a wait.
#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<Topics>,
}

impl TopicRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under `key`.
    ///
    /// Registering the same channel again under the same key is a no-op. A
    /// channel registered under another key is moved.
    pub fn register(&self, key: CorrelationKey, sender: EventSender) {
        let id = sender.id();
        let mut topics = self.topics.write();

        if let Some(previous) = topics.key_of.get(&id).cloned() {
            if previous == key {
                return;
            }
            topics.remove(&previous, id);
            tracing::debug!(subscriber = %id, from = %previous, to = %key, "subscriber moved");
        }

        topics.key_of.insert(id, key.clone());
        topics
            .by_key
            .entry(key.clone())
            .or_default()
            .insert(id, sender);

        tracing::debug!(subscriber = %id, key = %key, "subscriber registered");
    }

    /// Remove a channel from `key`. Absent keys or channels are ignored.
    ///
    /// Returns whether anything was removed.
    pub fn unregister(&self, key: &CorrelationKey, id: SubscriberId) -> bool {
        let removed = self.topics.write().remove(key, id);
        if removed {
            tracing::debug!(subscriber = %id, key = %key, "subscriber unregistered");
        }
        removed
    }

    /// Enqueue `event` on every channel under `key` and under the wildcard.
    ///
    /// The wildcard set is visited once even when `key` is the wildcard.
    pub fn publish(&self, key: &CorrelationKey, event: &SharedEvent) -> PublishReport {
        let topics = self.topics.read();
        let mut report = PublishReport::default();

        fan_out(topics.by_key.get(key), event, &mut report);
        if !key.is_wildcard() {
            fan_out(
                topics.by_key.get(&CorrelationKey::wildcard()),
                event,
                &mut report,
            );
        }

        report
    }

    /// Enqueue `event` on the channels under exactly `key`.
    pub fn publish_to(&self, key: &CorrelationKey, event: &SharedEvent) -> PublishReport {
        let topics = self.topics.read();
        let mut report = PublishReport::default();
        fan_out(topics.by_key.get(key), event, &mut report);
        report
    }

    /// Number of keys with at least one channel.
    pub fn key_count(&self) -> usize {
        self.topics.read().by_key.len()
    }

    /// Number of registered channels across all keys.
    pub fn subscriber_count(&self) -> usize {
        self.topics.read().key_of.len()
    }

    /// Channels currently registered under `key`.
    pub fn subscribers_for(&self, key: &CorrelationKey) -> Vec<SubscriberId> {
        let topics = self.topics.read();
        let mut ids: Vec<_> = topics
            .by_key
            .get(key)
            .map(|set| set.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Whether the channel is registered under any key.
    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.topics.read().key_of.contains_key(&id)
    }

    /// Key the channel is registered under, if any.
    pub fn key_of(&self, id: SubscriberId) -> Option<CorrelationKey> {
        self.topics.read().key_of.get(&id).cloned()
    }

    /// Keys with at least one channel.
    pub fn keys(&self) -> Vec<CorrelationKey> {
        let mut keys: Vec<_> = self.topics.read().by_key.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop every registration. Subscribers see their channels end.
    pub fn clear(&self) -> usize {
        let mut topics = self.topics.write();
        let count = topics.key_of.len();
        topics.by_key.clear();
        topics.key_of.clear();
        if count > 0 {
            tracing::info!(subscribers = count, "registry cleared");
        }
        count
    }
}

fn fan_out(
    set: Option<&HashMap<SubscriberId, EventSender>>,
    event: &SharedEvent,
    report: &mut PublishReport,
) {
    let Some(set) = set else {
        return;
    };
    for sender in set.values() {
        let outcome = sender.try_enqueue(event);
        if outcome != Enqueue::Sent {
            tracing::trace!(subscriber = %sender.id(), ?outcome, "event dropped");
        }
        report.record(outcome);
    }
}
