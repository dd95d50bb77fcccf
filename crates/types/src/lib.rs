//! Core ledger types for iotload.
//!
//! Identities, account identifiers, sequence numbers and the signed
//! transaction envelope used by the spammer for both account funding and
//! log submission.

mod crypto;
mod hash;
mod identifiers;
mod signing;
mod transaction;

pub use crypto::{
    CryptoError, DecoratedSignature, Identity, SecretSeed, Signature, SECRET_SEED_PREFIX,
};
pub use hash::Hash;
pub use identifiers::{
    AccountId, BatchIndex, DeviceId, IdParseError, SequenceNumber, ACCOUNT_ID_PREFIX,
};
pub use signing::{transaction_signature_payload, Network, ENVELOPE_TYPE_TX};
pub use transaction::{
    Account, Amount, BuildError, EncodingError, Memo, Operation, Transaction,
    TransactionBuilder, TransactionEnvelope, BASE_FEE, MAX_MEMO_TEXT_LEN, MAX_OPS_PER_TX,
};
