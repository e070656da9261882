//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Message exceeds the negotiated size limit.
    #[error("message size {size} exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl Error {
    /// The close code a server should use when this error ends a connection.
    pub fn close_code(&self) -> crate::CloseCode {
        match self {
            Error::Serialization(_) => crate::CloseCode::InternalServerError,
            Error::Deserialization(_) | Error::MessageTooLarge { .. } | Error::InvalidMessage(_) => {
                crate::CloseCode::BadRequest
            }
        }
    }
}
