//! Purchase records that deliveries belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: u64,
    /// The listing that was bought.
    pub listing_id: u64,
    pub price: f64,
    /// Bank transaction reference of the payment.
    pub bank_tx_id: String,
    pub delivery_address: String,
    pub created_at: DateTime<Utc>,
}

/// Read access to purchases, used to resolve the purchase a delivery
/// belongs to.
pub trait PurchaseLookup: Send + Sync + 'static {
    fn purchase(&self, id: u64) -> Option<Purchase>;
}
