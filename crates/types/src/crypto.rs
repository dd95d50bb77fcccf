//! Ed25519 identities and signatures.
//!
//! Every simulated device, the funding account, and the collection account
//! is an [`Identity`]. Its public half is the ledger [`AccountId`]; its secret
//! half is a 32-byte [`SecretSeed`] that can be carried inside dispatch tasks
//! and rebuilt into a signing identity on the worker side.

use crate::hash::Hash;
use crate::identifiers::AccountId;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of the textual form of a secret seed.
pub const SECRET_SEED_PREFIX: char = 'S';

/// The 32-byte secret from which an identity is derived.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretSeed([u8; 32]);

impl SecretSeed {
    /// Wrap raw seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SECRET_SEED_PREFIX, hex::encode_upper(self.0))
    }
}

impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretSeed(<redacted>)")
    }
}

impl FromStr for SecretSeed {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim()
            .strip_prefix(SECRET_SEED_PREFIX)
            .ok_or(CryptoError::InvalidSecret)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(body, &mut bytes).map_err(|_| CryptoError::InvalidSecret)?;
        Ok(Self(bytes))
    }
}

/// An ed25519 keypair authorising transactions for one account.
#[derive(Clone)]
pub struct Identity {
    signing_key: ed25519_dalek::SigningKey,
}

impl Identity {
    /// Generate a new random identity from OS entropy.
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand::rngs::OsRng)
    }

    /// Generate a new identity from the given cryptographic RNG.
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Rebuild an identity from its secret seed.
    pub fn from_secret(secret: &SecretSeed) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(secret.as_bytes()),
        }
    }

    /// The network's root identity, derived from the network passphrase.
    ///
    /// Test networks fund this account at genesis, which makes it the default
    /// source of funds for provisioning.
    pub fn network_root(passphrase: &str) -> Self {
        let seed = Hash::from_bytes(passphrase.as_bytes());
        Self::from_secret(&SecretSeed::from_bytes(*seed.as_bytes()))
    }

    /// The ledger account controlled by this identity.
    pub fn account_id(&self) -> AccountId {
        AccountId(self.signing_key.verifying_key().to_bytes())
    }

    /// The secret seed of this identity.
    pub fn secret(&self) -> SecretSeed {
        SecretSeed(self.signing_key.to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.signing_key.sign(message).to_bytes().to_vec())
    }

    /// Sign a message and attach the signer's key hint.
    pub fn sign_decorated(&self, message: &[u8]) -> DecoratedSignature {
        DecoratedSignature {
            hint: self.account_id().hint(),
            signature: self.sign(message),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.account_id())
    }
}

/// An ed25519 signature (64 bytes).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Verify this signature against an account's public key.
    pub fn verify(&self, account: &AccountId, message: &[u8]) -> bool {
        use ed25519_dalek::Verifier;
        let key = match ed25519_dalek::VerifyingKey::from_bytes(account.as_bytes()) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let sig_array: [u8; 64] = match self.0.as_slice().try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig_array);
        key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.0);
        write!(f, "Signature({}..)", &hex[..hex.len().min(16)])
    }
}

/// A signature together with the hint of the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    /// Last four bytes of the signer's public key.
    pub hint: [u8; 4],
    /// The signature itself.
    pub signature: Signature,
}

/// Errors from key handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Secret must be 'S' followed by 64 hex characters")]
    InvalidSecret,
}
