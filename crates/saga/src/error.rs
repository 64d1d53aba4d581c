//! Saga error taxonomy.

use clients::ClientError;
use order_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the orchestrator and state machine.
///
/// Each variant carries a distinct caller-facing category: malformed input,
/// missing resource, illegal state transition, unreachable dependency, or a
/// failed durable write. Storage errors on the create path are always
/// preceded by compensation of any reserved stock.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Malformed input; rejected before any side effect.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced order does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested transition or reservation conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A remote dependency is unreachable or timed out. The whole create
    /// call is safe to retry; compensation bounds the leak to the
    /// documented crash window.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The durable write failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<ClientError> for SagaError {
    fn from(err: ClientError) -> Self {
        SagaError::Unavailable(err.to_string())
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
