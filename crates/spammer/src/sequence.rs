//! Sequence-number ledger.
//!
//! The single authority for each device account's next usable sequence
//! number. The dispatcher reserves one number per task before the task
//! leaves it; workers never touch the ledger.

use iotload_types::{AccountId, SequenceNumber};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Per-account sequence cursors, seeded from on-chain state.
///
/// Each cursor sits behind its own mutex, so reservations for one account
/// are totally ordered even when callers run in parallel, while different
/// accounts never contend.
#[derive(Debug, Default)]
pub struct SequenceLedger {
    cursors: HashMap<AccountId, Mutex<SequenceNumber>>,
}

impl SequenceLedger {
    /// Seed the ledger from authoritative account sequences.
    ///
    /// Fails if an account appears twice: there must be at most one live
    /// cursor per account.
    pub fn seed(
        accounts: impl IntoIterator<Item = (AccountId, SequenceNumber)>,
    ) -> Result<Self, SequenceError> {
        let mut cursors = HashMap::new();
        for (account, sequence) in accounts {
            if cursors.insert(account, Mutex::new(sequence)).is_some() {
                return Err(SequenceError::DuplicateAccount(account));
            }
        }
        Ok(Self { cursors })
    }

    /// Reserve the next sequence for `account`.
    ///
    /// Advances the stored cursor by exactly one and returns the value it
    /// held before; a transaction built from that value carries the
    /// advanced one.
    pub fn reserve(&self, account: &AccountId) -> Result<SequenceNumber, SequenceError> {
        let cursor = self
            .cursors
            .get(account)
            .ok_or(SequenceError::UnknownAccount(*account))?;
        let mut current = cursor.lock();
        let reserved = *current;
        *current = reserved.next();
        Ok(reserved)
    }

    /// Current cursor value without advancing it.
    pub fn peek(&self, account: &AccountId) -> Option<SequenceNumber> {
        self.cursors.get(account).map(|cursor| *cursor.lock())
    }

    /// Number of accounts tracked.
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Check if the ledger tracks no accounts.
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

/// Errors from sequence reservation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("No sequence cursor for account {0}")]
    UnknownAccount(AccountId),

    #[error("Account {0} seeded twice")]
    DuplicateAccount(AccountId),
}
