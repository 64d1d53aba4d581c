//! Client error types.

use thiserror::Error;

/// Errors surfaced by remote collaborator clients.
///
/// Business outcomes (missing product, insufficient stock) are closed
/// result variants on the individual operations, not errors; this type
/// covers only the transport layer. No client retries automatically — a
/// timeout surfaces directly as `Unavailable`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote resource is unreachable or timed out.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}
