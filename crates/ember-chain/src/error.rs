//! Chain error types.

use thiserror::Error;

/// Chain errors.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Backing storage failed.
    #[error("chain storage error: {0}")]
    Storage(String),

    /// Internal error.
    #[error("internal chain error: {0}")]
    Internal(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
