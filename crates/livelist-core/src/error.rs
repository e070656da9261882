//! Core error types.

use thiserror::Error;

/// Errors raised by the todo list and subscription streams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The referenced item does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Producing a snapshot or update failed.
    #[error("execution error: {0}")]
    Execution(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
