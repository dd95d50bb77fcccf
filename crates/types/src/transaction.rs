//! Transactions, builder and signed envelopes.
//!
//! The envelope is serialized with bincode and base64-encoded into the
//! `blob` form that submission endpoints accept.

use crate::crypto::{DecoratedSignature, Identity};
use crate::hash::Hash;
use crate::identifiers::{AccountId, SequenceNumber};
use crate::signing::{transaction_signature_payload, Network};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of operations the network accepts in one transaction.
pub const MAX_OPS_PER_TX: usize = 100;

/// Maximum length in bytes of a text memo.
pub const MAX_MEMO_TEXT_LEN: usize = 28;

/// Default per-operation fee in stroops.
pub const BASE_FEE: u32 = 100;

const STROOPS_PER_UNIT: i64 = 10_000_000;

/// An amount of the native asset, in stroops (1e-7 units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(i64);

impl Amount {
    /// The smallest transferable amount.
    pub const ONE_STROOP: Self = Amount(1);

    /// Create an amount from stroops.
    pub fn from_stroops(stroops: i64) -> Self {
        Amount(stroops)
    }

    /// Create an amount from whole units.
    pub fn from_units(units: i64) -> Self {
        Amount(units.saturating_mul(STROOPS_PER_UNIT))
    }

    /// Get the raw stroop count.
    pub fn stroops(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / STROOPS_PER_UNIT as u64;
        let frac = abs % STROOPS_PER_UNIT as u64;
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let frac = format!("{:07}", frac);
            write!(f, "{}{}.{}", sign, whole, frac.trim_end_matches('0'))
        }
    }
}

/// Transaction memo.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Memo {
    #[default]
    None,
    Text(String),
}

/// A single ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create and fund a new account.
    CreateAccount {
        destination: AccountId,
        starting_balance: Amount,
    },
    /// Pay native asset to an existing account.
    Payment {
        destination: AccountId,
        amount: Amount,
    },
}

/// A source account handle: id plus the sequence number last used on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    sequence: SequenceNumber,
}

impl Account {
    pub fn new(id: AccountId, sequence: SequenceNumber) -> Self {
        Self { id, sequence }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Advance the local sequence and return the new value.
    pub fn increment_sequence(&mut self) -> SequenceNumber {
        self.sequence = self.sequence.next();
        self.sequence
    }
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub source: AccountId,
    /// Total fee in stroops.
    pub fee: u32,
    pub sequence: SequenceNumber,
    pub memo: Memo,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Serialize the transaction body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(bincode::serialize(self)?)
    }

    /// The hash that signers sign on `network`.
    pub fn hash(&self, network: &Network) -> Result<Hash, EncodingError> {
        Ok(transaction_signature_payload(network, &self.to_bytes()?))
    }
}

/// Builds a transaction from a source account, incrementing its sequence.
pub struct TransactionBuilder<'a> {
    source: &'a mut Account,
    base_fee: u32,
    memo: Memo,
    operations: Vec<Operation>,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(source: &'a mut Account, base_fee: u32) -> Self {
        Self {
            source,
            base_fee,
            memo: Memo::None,
            operations: Vec::new(),
        }
    }

    pub fn add_operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn add_memo(mut self, memo: Memo) -> Self {
        self.memo = memo;
        self
    }

    /// Validate and build. On success the source account's sequence has been
    /// advanced to the sequence carried by the transaction.
    pub fn build(self) -> Result<Transaction, BuildError> {
        if self.operations.is_empty() {
            return Err(BuildError::NoOperations);
        }
        if self.operations.len() > MAX_OPS_PER_TX {
            return Err(BuildError::TooManyOperations(self.operations.len()));
        }
        if let Memo::Text(text) = &self.memo {
            if text.len() > MAX_MEMO_TEXT_LEN {
                return Err(BuildError::MemoTooLong(text.len()));
            }
        }
        for op in &self.operations {
            let amount = match op {
                Operation::CreateAccount {
                    starting_balance, ..
                } => starting_balance,
                Operation::Payment { amount, .. } => amount,
            };
            if amount.stroops() <= 0 {
                return Err(BuildError::NonPositiveAmount(*amount));
            }
        }

        let fee = self
            .base_fee
            .saturating_mul(self.operations.len() as u32);
        let sequence = self.source.increment_sequence();

        Ok(Transaction {
            source: self.source.id(),
            fee,
            sequence,
            memo: self.memo,
            operations: self.operations,
        })
    }
}

/// A transaction plus its signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub tx: Transaction,
    pub signatures: Vec<DecoratedSignature>,
}

impl TransactionEnvelope {
    /// Wrap an unsigned transaction.
    pub fn new(tx: Transaction) -> Self {
        Self {
            tx,
            signatures: Vec::new(),
        }
    }

    /// Add a signature by `identity` for `network`.
    pub fn sign(&mut self, network: &Network, identity: &Identity) -> Result<(), EncodingError> {
        let payload = self.tx.hash(network)?;
        self.signatures
            .push(identity.sign_decorated(payload.as_bytes()));
        Ok(())
    }

    /// Check that some signature on the envelope was made by `account`.
    pub fn is_signed_by(&self, network: &Network, account: &AccountId) -> bool {
        let payload = match self.tx.hash(network) {
            Ok(p) => p,
            Err(_) => return false,
        };
        self.signatures.iter().any(|decorated| {
            decorated.hint == account.hint()
                && decorated.signature.verify(account, payload.as_bytes())
        })
    }

    /// Encode the envelope into its base64 submission blob.
    pub fn to_blob(&self) -> Result<String, EncodingError> {
        let bytes = bincode::serialize(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Decode an envelope from its base64 submission blob.
    pub fn from_blob(blob: &str) -> Result<Self, EncodingError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(blob)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

/// Errors building a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Transaction has no operations")]
    NoOperations,

    #[error("Transaction has {0} operations, maximum is {MAX_OPS_PER_TX}")]
    TooManyOperations(usize),

    #[error("Memo text is {0} bytes, maximum is {MAX_MEMO_TEXT_LEN}")]
    MemoTooLong(usize),

    #[error("Operation amount must be positive, got {0}")]
    NonPositiveAmount(Amount),
}

/// Errors encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Binary encoding failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Invalid base64 blob: {0}")]
    Base64(#[from] base64::DecodeError),
}
