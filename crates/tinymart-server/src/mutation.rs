//! Delivery write path.
//!
//! Every successful status write is published to subscribers before the
//! stored record is returned. A status can only be recorded for a purchase
//! that exists.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use tinymart_core::{DeliveryFilter, DeliveryStore, Error, PurchaseStore, Publisher};
use tinymart_proto::{Delivery, DeliveryEvent, DeliveryStatus, Purchase};

/// A purchase id as clients send it: a GraphQL `ID` string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IdInput {
    Number(u64),
    Text(String),
}

impl IdInput {
    /// Parse into a positive id.
    pub fn parse(&self) -> Result<u64, Error> {
        let id = match self {
            IdInput::Number(n) => *n,
            IdInput::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::Validation(format!("invalid purchase id `{}`", s)))?,
        };
        if id == 0 {
            return Err(Error::Validation("purchase id must be positive".to_string()));
        }
        Ok(id)
    }
}

impl From<u64> for IdInput {
    fn from(id: u64) -> Self {
        IdInput::Number(id)
    }
}

impl From<&str> for IdInput {
    fn from(id: &str) -> Self {
        IdInput::Text(id.to_string())
    }
}

/// Request to record a delivery status change.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDelivery {
    pub purchase_id: IdInput,
    pub status: String,
}

impl CreateDelivery {
    pub fn new(purchase_id: impl Into<IdInput>, status: impl Into<String>) -> Self {
        Self {
            purchase_id: purchase_id.into(),
            status: status.into(),
        }
    }
}

/// Request to record a purchase.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchase {
    pub listing_id: IdInput,
    pub price: f64,
    pub bank_tx_id: String,
    pub delivery_address: String,
}

/// Writes delivery updates and publishes them.
pub struct DeliveryService {
    store: Arc<DeliveryStore>,
    purchases: Arc<PurchaseStore>,
    publisher: Publisher,
    /// Held across write and publish so subscribers see writes in order.
    write_order: Mutex<()>,
}

impl DeliveryService {
    pub fn new(
        store: Arc<DeliveryStore>,
        purchases: Arc<PurchaseStore>,
        publisher: Publisher,
    ) -> Self {
        Self {
            store,
            purchases,
            publisher,
            write_order: Mutex::new(()),
        }
    }

    /// Record a purchase that deliveries can then refer to.
    pub fn record_purchase(&self, request: CreatePurchase) -> Result<Purchase, Error> {
        let listing_id = request
            .listing_id
            .parse()
            .map_err(|_| Error::Validation("listing id must be a positive integer".to_string()))?;
        if !request.price.is_finite() || request.price < 0.0 {
            return Err(Error::Validation(format!("invalid price {}", request.price)));
        }
        if request.delivery_address.trim().is_empty() {
            return Err(Error::Validation("delivery address must not be empty".to_string()));
        }

        let purchase = self.purchases.create(
            listing_id,
            request.price,
            request.bank_tx_id,
            request.delivery_address.trim(),
        );
        tracing::debug!(purchase_id = purchase.id, listing_id, "purchase recorded");
        Ok(purchase)
    }

    pub fn purchase(&self, id: u64) -> Result<Purchase, Error> {
        self.purchases.get(id).ok_or_else(|| Error::NotFound {
            entity: "purchase",
            id: id.to_string(),
        })
    }

    /// Validate, store, and publish a status change.
    ///
    /// Nothing is written or published when validation fails or the
    /// purchase does not exist.
    pub fn record_status(&self, request: CreateDelivery) -> Result<Delivery, Error> {
        let purchase_id = request.purchase_id.parse()?;
        let status = DeliveryStatus::from_str(&request.status)?;
        if !self.purchases.contains(purchase_id) {
            return Err(Error::NotFound {
                entity: "purchase",
                id: purchase_id.to_string(),
            });
        }

        let _ordered = self.write_order.lock();
        let delivery = self.store.create(purchase_id, status);
        self.publisher
            .publish_domain_event(DeliveryEvent::from(&delivery));

        tracing::debug!(
            delivery_id = delivery.id,
            purchase_id,
            status = %status,
            "delivery status recorded"
        );
        Ok(delivery)
    }

    pub fn get(&self, id: u64) -> Result<Delivery, Error> {
        self.store.get(id).ok_or_else(|| Error::NotFound {
            entity: "delivery",
            id: id.to_string(),
        })
    }

    pub fn list(&self, filter: &DeliveryFilter) -> Vec<Delivery> {
        self.store.list(filter)
    }

    pub fn count(&self) -> usize {
        self.store.len()
    }
}
