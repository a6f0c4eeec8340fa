//! Sync error types.

use thiserror::Error;

/// Sync errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(#[from] ember_network::NetworkError),

    /// Chain error.
    #[error("chain error: {0}")]
    Chain(#[from] ember_chain::ChainError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
