//! # ember-core
//!
//! Core chain types shared across the Ember node: block headers, signed
//! transactions with lazy sender recovery, and full blocks.
//!
//! Hashing follows the Ethereum convention: the identity of a header or
//! transaction is the Keccak-256 digest of its RLP encoding.

mod block;
mod transaction;

pub use block::{Block, BlockHeader};
pub use transaction::{Signature, Transaction};

pub use primitive_types::{H160, H256, U256};

/// 20-byte account address.
pub type Address = H160;

/// Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> H256 {
    use sha3::{Digest, Keccak256};
    H256::from_slice(&Keccak256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_matches_known_vector() {
        // keccak256("") is a well-known constant.
        let empty = keccak256(b"");
        assert_eq!(
            hex::encode(empty.as_bytes()),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn keccak256_differs_per_input() {
        assert_ne!(keccak256(b"a"), keccak256(b"b"));
    }
}
