//! Dispatch error types.

use thiserror::Error;

/// Errors surfaced to the caller of a dispatch.
///
/// Registry failures never appear here: they are absorbed by keeping the
/// previous directory or by skipping the candidate.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("device id must not be empty")]
    InvalidDeviceId,

    #[error("no edge nodes available")]
    NoCandidate,

    #[error("binding store error: {0}")]
    Storage(#[from] dispatch_state::StateError),

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
