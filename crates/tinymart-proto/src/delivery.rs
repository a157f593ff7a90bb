//! Delivery records and the domain event published when one is written.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Status of a delivery.
///
/// The wire form is the upper-case enum name used by the GraphQL schema.
/// The lower-case storage names are accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    #[serde(alias = "packed")]
    Packed,
    #[serde(alias = "out_for_delivery")]
    OutForDelivery,
    #[serde(alias = "delivered")]
    Delivered,
    #[serde(alias = "rescheduled")]
    Rescheduled,
    #[serde(alias = "canceled")]
    Canceled,
}

impl DeliveryStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Packed,
        DeliveryStatus::OutForDelivery,
        DeliveryStatus::Delivered,
        DeliveryStatus::Rescheduled,
        DeliveryStatus::Canceled,
    ];

    /// The wire (GraphQL enum) name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Packed => "PACKED",
            DeliveryStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Rescheduled => "RESCHEDULED",
            DeliveryStatus::Canceled => "CANCELED",
        }
    }

    /// The storage name.
    pub fn storage_name(&self) -> &'static str {
        match self {
            DeliveryStatus::Packed => "packed",
            DeliveryStatus::OutForDelivery => "out_for_delivery",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Rescheduled => "rescheduled",
            DeliveryStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == trimmed || status.storage_name() == trimmed)
            .ok_or_else(|| ProtocolError::InvalidStatus(s.to_string()))
    }
}

/// A stored delivery status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// Delivery record id.
    pub id: u64,
    /// The purchase this delivery belongs to.
    pub purchase_id: u64,
    /// Status recorded by this update.
    pub status: DeliveryStatus,
    /// When the update was written.
    pub timestamp: DateTime<Utc>,
}

/// Immutable snapshot of a delivery status change.
///
/// Produced once per successful write and fanned out to subscribers. The
/// purchase id is the parent identifier used for correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEvent {
    pub delivery_id: u64,
    pub purchase_id: u64,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryEvent {
    /// Create a new delivery event.
    pub fn new(
        delivery_id: u64,
        purchase_id: u64,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            delivery_id,
            purchase_id,
            status,
            timestamp,
        }
    }

    /// The parent identifier, stringified, that routes this event.
    pub fn parent_id(&self) -> String {
        self.purchase_id.to_string()
    }
}

impl From<&Delivery> for DeliveryEvent {
    fn from(delivery: &Delivery) -> Self {
        Self::new(
            delivery.id,
            delivery.purchase_id,
            delivery.status,
            delivery.timestamp,
        )
    }
}
