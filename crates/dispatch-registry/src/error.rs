//! Registry error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by registry queries.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry unreachable: {0}")]
    Connect(String),

    #[error("registry request timed out after {0:?}")]
    Timeout(Duration),

    #[error("registry returned status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("invalid node name: {0:?}")]
    InvalidNodeName(String),

    #[error("invalid registry response: {0}")]
    Decode(String),

    #[error("registry unavailable")]
    Unavailable,

    #[error("registry configuration error: {0}")]
    Config(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
