//! Deterministic chain generators for tests.

use ember_core::{Address, Block, BlockHeader, Signature, Transaction, H256, U256};
use k256::ecdsa::SigningKey;

/// Deterministic signing key. `seed` must stay below 0xff so the repeated
/// byte pattern remains a valid scalar.
pub fn test_key(seed: u8) -> SigningKey {
    let byte = seed.clamp(1, 0xfe);
    SigningKey::from_bytes(&[byte; 32].into()).expect("valid test scalar")
}

/// A properly signed transfer whose sender recovers to the key's address.
pub fn signed_transaction(key: &SigningKey, nonce: u64) -> Transaction {
    let unsigned = Transaction::new(
        nonce,
        U256::from(20_000_000_000u64),
        21_000,
        Some(Address::repeat_byte(0x42)),
        U256::from(1u64),
        vec![],
        Signature::new(0, H256::zero(), H256::zero()),
    );
    let hash = unsigned.signing_hash();
    let (sig, recovery) = key
        .sign_prehash_recoverable(hash.as_bytes())
        .expect("signing");
    let bytes = sig.to_bytes();
    Transaction::new(
        unsigned.nonce,
        unsigned.gas_price,
        unsigned.gas_limit,
        unsigned.to,
        unsigned.value,
        unsigned.payload,
        Signature::new(
            recovery.to_byte(),
            H256::from_slice(&bytes[..32]),
            H256::from_slice(&bytes[32..]),
        ),
    )
}

/// Test genesis block.
pub fn genesis() -> Block {
    Block::new(
        BlockHeader::new(H256::zero(), 0, U256::from(0x20000), 0, b"ember-test".to_vec()),
        vec![],
    )
}

/// Linear chain of `len` blocks following `parent`, each carrying
/// `txs_per_block` signed transactions.
pub fn chain_after(parent: &BlockHeader, len: usize, txs_per_block: usize) -> Vec<Block> {
    let key = test_key(7);
    let mut blocks = Vec::with_capacity(len);
    let mut parent = parent.clone();
    let mut nonce = 0u64;
    for _ in 0..len {
        let header = BlockHeader::new(
            parent.hash(),
            parent.number + 1,
            U256::from(0x20000),
            parent.timestamp + 13,
            vec![],
        );
        let transactions = (0..txs_per_block)
            .map(|_| {
                let tx = signed_transaction(&key, nonce);
                nonce += 1;
                tx
            })
            .collect();
        parent = header.clone();
        blocks.push(Block::new(header, transactions));
    }
    blocks
}

/// Headers of the given blocks, in order.
pub fn headers_of(blocks: &[Block]) -> Vec<BlockHeader> {
    blocks.iter().map(|b| b.header.clone()).collect()
}
