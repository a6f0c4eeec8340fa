//! Network error types.

use thiserror::Error;

/// Network errors surfaced to the sync engine.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The peer is no longer connected.
    #[error("peer disconnected")]
    Disconnected,

    /// The request could not be written to the wire.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
