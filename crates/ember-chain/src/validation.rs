//! Header validation contract.

use ember_core::BlockHeader;
use thiserror::Error;

/// Reason a header was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Difficulty must be non-zero on a PoW chain.
    #[error("zero difficulty")]
    ZeroDifficulty,

    /// Extra data is capped.
    #[error("extra data is {got} bytes, limit {limit}")]
    ExtraTooLong {
        /// Observed length.
        got: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The genesis header never arrives over the wire.
    #[error("unexpected genesis header")]
    Genesis,

    /// Implementation-specific rejection.
    #[error("{0}")]
    Other(String),
}

/// Pure predicate over a block header.
///
/// Implementations run the stateless checks that make sense before a header
/// is admitted to the sync queue; contextual validation happens again at
/// import time.
pub trait HeaderValidator: Send + Sync {
    /// Validate a single header.
    fn validate(&self, header: &BlockHeader) -> Result<(), HeaderError>;
}

/// Maximum extra-data length accepted by [`BasicHeaderValidator`].
const MAX_EXTRA_BYTES: usize = 32;

/// Validator performing basic stateless sanity checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicHeaderValidator;

impl HeaderValidator for BasicHeaderValidator {
    fn validate(&self, header: &BlockHeader) -> Result<(), HeaderError> {
        if header.number == 0 {
            return Err(HeaderError::Genesis);
        }
        if header.difficulty.is_zero() {
            return Err(HeaderError::ZeroDifficulty);
        }
        if header.extra.len() > MAX_EXTRA_BYTES {
            return Err(HeaderError::ExtraTooLong {
                got: header.extra.len(),
                limit: MAX_EXTRA_BYTES,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{H256, U256};

    fn header(number: u64, difficulty: u64, extra: Vec<u8>) -> BlockHeader {
        BlockHeader::new(H256::zero(), number, U256::from(difficulty), 0, extra)
    }

    #[test]
    fn accepts_plain_header() {
        let v = BasicHeaderValidator;
        assert_eq!(v.validate(&header(1, 0x20000, vec![])), Ok(()));
    }

    #[test]
    fn rejects_genesis_height() {
        let v = BasicHeaderValidator;
        assert_eq!(v.validate(&header(0, 0x20000, vec![])), Err(HeaderError::Genesis));
    }

    #[test]
    fn rejects_zero_difficulty() {
        let v = BasicHeaderValidator;
        assert_eq!(
            v.validate(&header(1, 0, vec![])),
            Err(HeaderError::ZeroDifficulty)
        );
    }

    #[test]
    fn rejects_oversized_extra() {
        let v = BasicHeaderValidator;
        assert!(matches!(
            v.validate(&header(1, 0x20000, vec![0; 64])),
            Err(HeaderError::ExtraTooLong { got: 64, .. })
        ));
    }
}
