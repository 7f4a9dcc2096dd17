//! Error types for the binding store.

use thiserror::Error;

/// Result type alias for binding store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during binding store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("stored value is not valid UTF-8 for key {0}")]
    Decode(String),

    #[error("invalid binding: {0}")]
    InvalidBinding(String),
}
