//! Signed transactions with lazy sender recovery.

use crate::{keccak256, Address, H256, U256};
use k256::ecdsa::{RecoveryId, Signature as RecoverableSignature, VerifyingKey};
use rlp::RlpStream;
use std::sync::OnceLock;

/// Recoverable secp256k1 signature attached to a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Recovery id. Both the raw form (0/1) and the legacy 27/28 encoding
    /// are accepted.
    pub v: u8,
    /// R component.
    pub r: H256,
    /// S component.
    pub s: H256,
}

impl Signature {
    /// Create a signature from its components.
    pub fn new(v: u8, r: H256, s: H256) -> Self {
        Self { v, r, s }
    }

    /// Recovery id normalized to 0..=3.
    pub fn recovery_id(&self) -> u8 {
        if self.v >= 27 {
            self.v - 27
        } else {
            self.v
        }
    }
}

/// A signed transaction.
///
/// The signer is not carried on the wire; recovering it takes a secp256k1
/// public-key recovery over the signing hash, which is by far the most
/// expensive part of handling a transaction. `sender()` performs the
/// recovery once and caches the result.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Sender account nonce.
    pub nonce: u64,
    /// Price per unit of gas.
    pub gas_price: U256,
    /// Gas limit for execution.
    pub gas_limit: u64,
    /// Recipient; `None` creates a contract.
    pub to: Option<Address>,
    /// Transferred value.
    pub value: U256,
    /// Call data.
    pub payload: Vec<u8>,
    /// Signature over `signing_hash()`.
    pub signature: Signature,
    sender: OnceLock<Option<Address>>,
}

impl Transaction {
    /// Create a signed transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nonce: u64,
        gas_price: U256,
        gas_limit: u64,
        to: Option<Address>,
        value: U256,
        payload: Vec<u8>,
        signature: Signature,
    ) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            payload,
            signature,
            sender: OnceLock::new(),
        }
    }

    /// Keccak-256 of the unsigned fields: the message the sender signed.
    pub fn signing_hash(&self) -> H256 {
        let mut s = RlpStream::new_list(6);
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        match self.to {
            Some(ref to) => s.append(to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&self.payload);
        keccak256(&s.out())
    }

    /// RLP encoding of the signed transaction.
    pub fn encoded(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(9);
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        match self.to {
            Some(ref to) => s.append(to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&self.payload);
        s.append(&self.signature.v);
        s.append(&self.signature.r);
        s.append(&self.signature.s);
        s.out().to_vec()
    }

    /// Transaction hash.
    pub fn hash(&self) -> H256 {
        keccak256(&self.encoded())
    }

    /// Recovered sender address, computed on first access and cached.
    ///
    /// `None` means the signature does not recover to a valid public key.
    pub fn sender(&self) -> Option<Address> {
        *self.sender.get_or_init(|| self.recover_sender())
    }

    fn recover_sender(&self) -> Option<Address> {
        let signature = RecoverableSignature::from_scalars(
            self.signature.r.to_fixed_bytes(),
            self.signature.s.to_fixed_bytes(),
        )
        .ok()?;
        let recovery = RecoveryId::from_byte(self.signature.recovery_id())?;
        let hash = self.signing_hash();
        let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &signature, recovery).ok()?;
        // An address is the low 20 bytes of the Keccak of the uncompressed
        // public key, SEC1 tag byte stripped.
        let point = key.to_encoded_point(false);
        let digest = keccak256(&point.as_bytes()[1..]);
        Some(Address::from_slice(&digest.as_bytes()[12..]))
    }
}
