//! In-memory delivery and purchase stores.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use tinymart_proto::{Delivery, DeliveryStatus, Purchase, PurchaseLookup};

/// Filter for listing deliveries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryFilter {
    pub purchase_id: Option<u64>,
    pub status: Option<DeliveryStatus>,
    /// Inclusive lower bound on the timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the timestamp.
    pub to: Option<DateTime<Utc>>,
}

impl DeliveryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_purchase_id(mut self, purchase_id: u64) -> Self {
        self.purchase_id = Some(purchase_id);
        self
    }

    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Whether `delivery` passes every set criterion.
    pub fn matches(&self, delivery: &Delivery) -> bool {
        self.purchase_id.map_or(true, |id| delivery.purchase_id == id)
            && self.status.map_or(true, |s| delivery.status == s)
            && self.from.map_or(true, |from| delivery.timestamp >= from)
            && self.to.map_or(true, |to| delivery.timestamp <= to)
    }
}

struct Inner {
    next_id: u64,
    records: BTreeMap<u64, Delivery>,
}

/// Thread-safe store of delivery status updates.
///
/// Ids are assigned from 1 in write order.
pub struct DeliveryStore {
    inner: RwLock<Inner>,
}

impl Default for DeliveryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                records: BTreeMap::new(),
            }),
        }
    }

    /// Record a status update stamped with the current time.
    pub fn create(&self, purchase_id: u64, status: DeliveryStatus) -> Delivery {
        self.create_at(purchase_id, status, Utc::now())
    }

    /// Record a status update with an explicit timestamp.
    pub fn create_at(
        &self,
        purchase_id: u64,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    ) -> Delivery {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;

        let delivery = Delivery {
            id,
            purchase_id,
            status,
            timestamp,
        };
        inner.records.insert(id, delivery.clone());
        delivery
    }

    pub fn get(&self, id: u64) -> Option<Delivery> {
        self.inner.read().records.get(&id).cloned()
    }

    /// Deliveries matching `filter`, newest first.
    pub fn list(&self, filter: &DeliveryFilter) -> Vec<Delivery> {
        let inner = self.inner.read();
        let mut found: Vec<_> = inner
            .records
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        found
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct PurchaseRecords {
    next_id: u64,
    records: BTreeMap<u64, Purchase>,
}

/// Thread-safe store of purchases. Deliveries may only reference purchases
/// recorded here.
pub struct PurchaseStore {
    inner: RwLock<PurchaseRecords>,
}

impl Default for PurchaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PurchaseStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PurchaseRecords {
                next_id: 1,
                records: BTreeMap::new(),
            }),
        }
    }

    /// Record a purchase stamped with the current time.
    pub fn create(
        &self,
        listing_id: u64,
        price: f64,
        bank_tx_id: impl Into<String>,
        delivery_address: impl Into<String>,
    ) -> Purchase {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;

        let purchase = Purchase {
            id,
            listing_id,
            price,
            bank_tx_id: bank_tx_id.into(),
            delivery_address: delivery_address.into(),
            created_at: Utc::now(),
        };
        inner.records.insert(id, purchase.clone());
        purchase
    }

    pub fn get(&self, id: u64) -> Option<Purchase> {
        self.inner.read().records.get(&id).cloned()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.inner.read().records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PurchaseLookup for PurchaseStore {
    fn purchase(&self, id: u64) -> Option<Purchase> {
        self.get(id)
    }
}
