//! Network-separated signing payloads.
//!
//! A signature over a transaction must never be valid on another network.
//! The payload is therefore built by prefixing the serialized transaction
//! with the network id and an envelope type tag, then hashing the whole:
//!
//! | Part | Bytes |
//! |------|-------|
//! | network id | `sha256(passphrase)` |
//! | envelope type | [`ENVELOPE_TYPE_TX`] |
//! | transaction | bincode-encoded [`Transaction`](crate::Transaction) |

use crate::hash::Hash;

/// Envelope type tag for ordinary transactions.
pub const ENVELOPE_TYPE_TX: &[u8] = b"ENVELOPE_TYPE_TX";

/// A ledger network, identified by its passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    passphrase: String,
    id: Hash,
}

impl Network {
    /// Create a network definition from its passphrase.
    pub fn new(passphrase: impl Into<String>) -> Self {
        let passphrase = passphrase.into();
        let id = Hash::from_bytes(passphrase.as_bytes());
        Self { passphrase, id }
    }

    /// The passphrase this network was created from.
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// The network id (hash of the passphrase).
    pub fn id(&self) -> &Hash {
        &self.id
    }
}

/// Build the hash that is signed for a transaction on `network`.
pub fn transaction_signature_payload(network: &Network, tx_bytes: &[u8]) -> Hash {
    Hash::from_parts(&[network.id().as_bytes(), ENVELOPE_TYPE_TX, tx_bytes])
}
