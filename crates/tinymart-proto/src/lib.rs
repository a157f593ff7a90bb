//! tinymart protocol types.
//!
//! This crate defines the types shared by the fan-out core and the server:
//!
//! - [`delivery`] - Delivery records, statuses, and the domain event published on writes
//! - [`message`] - Session protocol messages exchanged over the subscription socket
//! - [`payload`] - Serialization of domain events into subscription payloads
//! - [`purchase`] - Purchase records and the lookup used to resolve them
//! - [`error`] - Protocol error types
//!
//! The session protocol is the legacy `graphql-ws` message set: every frame is
//! a JSON object with a `type` field and, depending on the type, an `id` and a
//! `payload`.

pub mod delivery;
pub mod error;
pub mod message;
pub mod payload;
pub mod purchase;

pub use delivery::{Delivery, DeliveryEvent, DeliveryStatus};
pub use error::ProtocolError;
pub use message::{ClientMessage, Envelope, ServerMessage, StartPayload};
pub use payload::{DeliveryUpdatedSerializer, EventSerializer, SubscriptionResult};
pub use purchase::{Purchase, PurchaseLookup};

/// WebSocket subprotocol negotiated with subscription clients.
pub const SUBPROTOCOL: &str = "graphql-ws";

/// Default name of the `start` variable carrying the correlation key.
pub const DEFAULT_CORRELATION_VARIABLE: &str = "purchaseId";
