//! Serialization of domain events into subscription payloads.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::delivery::{DeliveryEvent, DeliveryStatus};
use crate::message::ServerMessage;
use crate::purchase::{Purchase, PurchaseLookup};

/// Root field of the delivery subscription.
pub const DELIVERY_UPDATED_FIELD: &str = "deliveryUpdated";

/// Outcome of turning one event into a subscription result.
///
/// Decided once at the protocol boundary and mapped onto either a `data` or
/// an `error` message for the subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionResult {
    Data(Value),
    Error(String),
}

impl SubscriptionResult {
    /// Map onto the protocol message for subscription `id`.
    pub fn into_message(self, id: impl Into<String>) -> ServerMessage {
        match self {
            SubscriptionResult::Data(data) => ServerMessage::data(id, data),
            SubscriptionResult::Error(message) => ServerMessage::error(Some(id.into()), message),
        }
    }
}

/// Turns a domain event into the payload a subscriber receives.
pub trait EventSerializer: Send + Sync + 'static {
    fn serialize(&self, event: &DeliveryEvent) -> SubscriptionResult;
}

impl<F> EventSerializer for F
where
    F: Fn(&DeliveryEvent) -> SubscriptionResult + Send + Sync + 'static,
{
    fn serialize(&self, event: &DeliveryEvent) -> SubscriptionResult {
        self(event)
    }
}

/// Delivery as exposed to subscription clients.
///
/// Ids are GraphQL `ID`s and therefore strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryView {
    id: String,
    purchase_id: String,
    status: DeliveryStatus,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    purchase: Option<PurchaseView>,
}

impl From<&DeliveryEvent> for DeliveryView {
    fn from(event: &DeliveryEvent) -> Self {
        Self {
            id: event.delivery_id.to_string(),
            purchase_id: event.parent_id(),
            status: event.status,
            timestamp: event.timestamp.to_rfc3339(),
            purchase: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseView {
    id: String,
    listing_id: String,
    price: f64,
    bank_tx_id: String,
    delivery_address: String,
    created_at: String,
}

impl From<Purchase> for PurchaseView {
    fn from(purchase: Purchase) -> Self {
        Self {
            id: purchase.id.to_string(),
            listing_id: purchase.listing_id.to_string(),
            price: purchase.price,
            bank_tx_id: purchase.bank_tx_id,
            delivery_address: purchase.delivery_address,
            created_at: purchase.created_at.to_rfc3339(),
        }
    }
}

/// Produces `{"deliveryUpdated": {...}}` payloads.
///
/// With a purchase lookup attached, the delivery also carries its resolved
/// `purchase`. A purchase that cannot be resolved turns the event into an
/// error result for that subscription.
#[derive(Clone, Default)]
pub struct DeliveryUpdatedSerializer {
    purchases: Option<Arc<dyn PurchaseLookup>>,
}

impl DeliveryUpdatedSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve each delivery's purchase through `purchases`.
    pub fn with_purchases(mut self, purchases: Arc<dyn PurchaseLookup>) -> Self {
        self.purchases = Some(purchases);
        self
    }
}

impl fmt::Debug for DeliveryUpdatedSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryUpdatedSerializer")
            .field("resolves_purchase", &self.purchases.is_some())
            .finish()
    }
}

impl EventSerializer for DeliveryUpdatedSerializer {
    fn serialize(&self, event: &DeliveryEvent) -> SubscriptionResult {
        let mut view = DeliveryView::from(event);
        if let Some(purchases) = &self.purchases {
            match purchases.purchase(event.purchase_id) {
                Some(purchase) => view.purchase = Some(PurchaseView::from(purchase)),
                None => {
                    return SubscriptionResult::Error(format!(
                        "purchase {} not found",
                        event.purchase_id
                    ))
                }
            }
        }

        match serde_json::to_value(view) {
            Ok(view) => SubscriptionResult::Data(json!({ DELIVERY_UPDATED_FIELD: view })),
            Err(e) => SubscriptionResult::Error(format!("failed to serialize delivery: {}", e)),
        }
    }
}
