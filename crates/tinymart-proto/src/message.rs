//! Session protocol messages.
//!
//! Inbound frames are decoded in two steps: first into a loose [`Envelope`]
//! so that a bad payload can still be answered with the subscription id it
//! belongs to, then into a typed [`ClientMessage`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Message type names of the `graphql-ws` protocol.
pub mod types {
    pub const CONNECTION_INIT: &str = "connection_init";
    pub const CONNECTION_ACK: &str = "connection_ack";
    pub const CONNECTION_TERMINATE: &str = "connection_terminate";
    pub const KEEP_ALIVE: &str = "ka";
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const DATA: &str = "data";
    pub const ERROR: &str = "error";
    pub const COMPLETE: &str = "complete";
}

/// Loosely typed inbound frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Payload of a `start` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default)]
    pub operation_name: Option<String>,
}

impl StartPayload {
    /// Create a payload with no variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    /// Set a variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// Read the correlation value carried in `variable`.
    ///
    /// Numeric ids are normalized the way the write path parses them, so
    /// `"07"`, `" 7"` and `7` all yield `"7"`. Other strings are trimmed and
    /// otherwise taken as-is. A missing or null variable yields `None`, which
    /// subscribes to everything.
    pub fn correlation_value(&self, variable: &str) -> Result<Option<String>, String> {
        match self.variables.as_ref().and_then(|vars| vars.get(variable)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(normalize_id(s))),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(format!(
                "variable `{}` must be an ID, got {}",
                variable, other
            )),
        }
    }
}

fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<u64>() {
        Ok(id) => id.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// A decoded client-to-server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    ConnectionInit,
    Start { id: String, payload: StartPayload },
    Stop { id: String },
    ConnectionTerminate,
}

impl ClientMessage {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ProtocolError::InvalidEnvelope(e.to_string()))?;
        Self::try_from(envelope)
    }

    /// The protocol type name of this message.
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::ConnectionInit => types::CONNECTION_INIT,
            ClientMessage::Start { .. } => types::START,
            ClientMessage::Stop { .. } => types::STOP,
            ClientMessage::ConnectionTerminate => types::CONNECTION_TERMINATE,
        }
    }
}

impl TryFrom<Envelope> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let Envelope {
            message_type,
            id,
            payload,
        } = envelope;

        match message_type.as_str() {
            types::CONNECTION_INIT => Ok(ClientMessage::ConnectionInit),
            types::CONNECTION_TERMINATE => Ok(ClientMessage::ConnectionTerminate),
            types::STOP => {
                let id = id.ok_or(ProtocolError::MissingId { message_type })?;
                Ok(ClientMessage::Stop { id })
            }
            types::START => {
                let id = id.ok_or(ProtocolError::MissingId { message_type })?;
                let payload = payload.ok_or_else(|| ProtocolError::InvalidPayload {
                    id: id.clone(),
                    reason: "missing payload".to_string(),
                })?;
                let payload: StartPayload =
                    serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
                        id: id.clone(),
                        reason: e.to_string(),
                    })?;
                if payload.query.trim().is_empty() {
                    return Err(ProtocolError::InvalidPayload {
                        id,
                        reason: "query must not be empty".to_string(),
                    });
                }
                Ok(ClientMessage::Start { id, payload })
            }
            _ => Err(ProtocolError::UnknownType { id, message_type }),
        }
    }
}

/// Payload of a `data` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPayload {
    pub data: Value,
}

/// Payload of an `error` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// A server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    #[serde(rename = "ka")]
    KeepAlive,
    Data {
        id: String,
        payload: DataPayload,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        payload: ErrorPayload,
    },
    Complete {
        id: String,
    },
}

impl ServerMessage {
    /// Build a `data` message.
    pub fn data(id: impl Into<String>, data: Value) -> Self {
        ServerMessage::Data {
            id: id.into(),
            payload: DataPayload { data },
        }
    }

    /// Build an `error` message.
    pub fn error(id: Option<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            id,
            payload: ErrorPayload {
                message: message.into(),
            },
        }
    }

    /// Build a `complete` message.
    pub fn complete(id: impl Into<String>) -> Self {
        ServerMessage::Complete { id: id.into() }
    }

    /// The subscription id this message refers to, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            ServerMessage::Data { id, .. } | ServerMessage::Complete { id } => Some(id),
            ServerMessage::Error { id, .. } => id.as_deref(),
            ServerMessage::ConnectionAck | ServerMessage::KeepAlive => None,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
