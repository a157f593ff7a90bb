//! Protocol error types.

use thiserror::Error;

use crate::message::ServerMessage;

/// Errors raised while decoding or validating client protocol messages.
///
/// None of these are fatal to a connection: each one is reported back to the
/// client as an `error` message and the session carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object with a string `type` field.
    #[error("invalid message format: {0}")]
    InvalidEnvelope(String),

    /// The `type` field names a message this server does not understand.
    #[error("unknown message type: {message_type}")]
    UnknownType {
        id: Option<String>,
        message_type: String,
    },

    /// A message that addresses a subscription arrived without an `id`.
    #[error("missing subscription id for {message_type} message")]
    MissingId { message_type: String },

    /// The `start` payload could not be decoded or is unusable.
    #[error("invalid subscription payload: {reason}")]
    InvalidPayload { id: String, reason: String },

    /// A `start` arrived before `connection_init`.
    #[error("connection not initialised")]
    NotInitialised { id: String },

    /// A delivery status name outside the known set.
    #[error("invalid delivery status: {0}")]
    InvalidStatus(String),
}

impl ProtocolError {
    /// The subscription id this error refers to, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            ProtocolError::UnknownType { id, .. } => id.as_deref(),
            ProtocolError::InvalidPayload { id, .. } | ProtocolError::NotInitialised { id } => {
                Some(id)
            }
            ProtocolError::InvalidEnvelope(_)
            | ProtocolError::MissingId { .. }
            | ProtocolError::InvalidStatus(_) => None,
        }
    }

    /// Render this error as the `error` message sent back to the client.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.subscription_id().map(str::to_string), self.to_string())
    }
}
