//! Core error types.

use thiserror::Error;

/// Core errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Input rejected before anything was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// Record lookup miss.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl From<tinymart_proto::ProtocolError> for Error {
    fn from(err: tinymart_proto::ProtocolError) -> Self {
        Error::Validation(err.to_string())
    }
}
