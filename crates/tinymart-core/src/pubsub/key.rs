//! Correlation keys.

use std::fmt;

use tinymart_proto::DeliveryEvent;

/// Routes published events to interested subscribers.
///
/// The empty key is the wildcard: channels registered under it receive every
/// published event regardless of its key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    /// Create a key from a parent identifier.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The wildcard key.
    pub fn wildcard() -> Self {
        Self(String::new())
    }

    /// Key for an optional identifier; `None` subscribes to everything.
    pub fn from_option(key: Option<String>) -> Self {
        key.map(Self::new).unwrap_or_default()
    }

    /// Key an event is published under.
    pub fn for_event(event: &DeliveryEvent) -> Self {
        Self(event.parent_id())
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            f.write_str("*")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for CorrelationKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CorrelationKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl From<u64> for CorrelationKey {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tinymart_proto::DeliveryStatus;

    #[test]
    fn test_wildcard() {
        assert!(CorrelationKey::wildcard().is_wildcard());
        assert!(CorrelationKey::from("").is_wildcard());
        assert!(CorrelationKey::from_option(None).is_wildcard());
        assert!(!CorrelationKey::from_option(Some("7".to_string())).is_wildcard());
        assert_eq!(CorrelationKey::wildcard().to_string(), "*");
    }

    #[test]
    fn test_for_event_stringifies_parent() {
        let event = DeliveryEvent::new(1, 7, DeliveryStatus::Packed, Utc::now());
        assert_eq!(CorrelationKey::for_event(&event), CorrelationKey::from(7u64));
        assert_eq!(CorrelationKey::for_event(&event).as_str(), "7");
    }
}
