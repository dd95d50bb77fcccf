//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of the textual form of an account id.
pub const ACCOUNT_ID_PREFIX: char = 'G';

/// Ledger account identifier (the account's ed25519 public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// Get the raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The four trailing key bytes, used as a signature hint.
    pub fn hint(&self) -> [u8; 4] {
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&self.0[28..]);
        hint
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ACCOUNT_ID_PREFIX, hex::encode_upper(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({}..)", &self.to_string()[..9])
    }
}

impl FromStr for AccountId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(ACCOUNT_ID_PREFIX)
            .ok_or(IdParseError::MissingPrefix(ACCOUNT_ID_PREFIX))?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(body, &mut bytes).map_err(|_| IdParseError::InvalidBody)?;
        Ok(AccountId(bytes))
    }
}

/// Per-account transaction sequence number.
///
/// The network requires every transaction from an account to carry exactly
/// the account's current sequence plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub i64);

impl SequenceNumber {
    /// The sequence number following this one.
    pub fn next(self) -> Self {
        SequenceNumber(self.0 + 1)
    }

    /// Get the raw value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a simulated device within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.0)
    }
}

/// Index of a dispatch batch (tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchIndex(pub u64);

impl fmt::Display for BatchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Batch({})", self.0)
    }
}

/// Errors parsing textual identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("Identifier must start with '{0}'")]
    MissingPrefix(char),

    #[error("Identifier body must be 64 hex characters")]
    InvalidBody,
}
