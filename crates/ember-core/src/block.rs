//! Block and header types.

use crate::{keccak256, Transaction, H256, U256};
use rlp::RlpStream;
use std::sync::OnceLock;

/// Block header.
///
/// The hash is the Keccak-256 of the RLP encoding, computed once on first
/// access and cached.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// Hash of the parent header.
    pub parent_hash: H256,
    /// Block height.
    pub number: u64,
    /// PoW difficulty of this block.
    pub difficulty: U256,
    /// Unix timestamp, seconds.
    pub timestamp: u64,
    /// Arbitrary extra bytes chosen by the miner.
    pub extra: Vec<u8>,
    hash: OnceLock<H256>,
}

impl BlockHeader {
    /// Create a header.
    pub fn new(
        parent_hash: H256,
        number: u64,
        difficulty: U256,
        timestamp: u64,
        extra: Vec<u8>,
    ) -> Self {
        Self {
            parent_hash,
            number,
            difficulty,
            timestamp,
            extra,
            hash: OnceLock::new(),
        }
    }

    /// Header hash.
    pub fn hash(&self) -> H256 {
        *self.hash.get_or_init(|| keccak256(&self.encoded()))
    }

    /// RLP encoding of the header.
    pub fn encoded(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(5);
        s.append(&self.parent_hash);
        s.append(&self.number);
        s.append(&self.difficulty);
        s.append(&self.timestamp);
        s.append(&self.extra);
        s.out().to_vec()
    }
}

impl PartialEq for BlockHeader {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for BlockHeader {}

/// A full block: header plus transaction list.
#[derive(Debug, Clone)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transactions in execution order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a block.
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Block height.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Block hash (the header hash).
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    /// Hash of the parent block.
    pub fn parent_hash(&self) -> H256 {
        self.header.parent_hash
    }

    /// RLP encoding: `[header, [tx, ...]]`.
    pub fn encoded(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(2);
        s.append_raw(&self.header.encoded(), 1);
        s.begin_list(self.transactions.len());
        for tx in &self.transactions {
            s.append_raw(&tx.encoded(), 1);
        }
        s.out().to_vec()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Block {}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, parent: H256) -> BlockHeader {
        BlockHeader::new(parent, number, U256::from(0x20000), 1_700_000_000 + number, vec![])
    }

    #[test]
    fn hash_is_stable() {
        let h = header(1, H256::zero());
        assert_eq!(h.hash(), h.hash());
        assert_eq!(h.hash(), h.clone().hash());
    }

    #[test]
    fn hash_covers_all_fields() {
        let base = header(1, H256::zero());
        let other_parent = header(1, H256::repeat_byte(1));
        let other_number = header(2, H256::zero());
        assert_ne!(base.hash(), other_parent.hash());
        assert_ne!(base.hash(), other_number.hash());
    }

    #[test]
    fn block_identity_is_the_header_hash() {
        let h = header(3, H256::repeat_byte(9));
        let block = Block::new(h.clone(), vec![]);
        assert_eq!(block.hash(), h.hash());
        assert_eq!(block.parent_hash(), H256::repeat_byte(9));
        assert_eq!(block.number(), 3);
    }

    #[test]
    fn encoded_block_embeds_the_header() {
        let h = header(4, H256::zero());
        let block = Block::new(h.clone(), vec![]);
        let encoded = block.encoded();
        assert!(!encoded.is_empty());
        // Header bytes appear verbatim inside the block encoding.
        let header_bytes = h.encoded();
        assert!(encoded
            .windows(header_bytes.len())
            .any(|w| w == header_bytes.as_slice()));
    }
}
