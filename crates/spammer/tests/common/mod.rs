//! In-memory ledger for exercising the spammer without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use iotload_spammer::client::{
    AccountInfo, ClientError, CoreSubmission, LedgerClient, Problem, ProblemExtras,
    ResultCodes, SubmitTransactionResponse, OP_ALREADY_EXISTS, TX_BAD_SEQ,
};
use iotload_spammer::SpammerConfig;
use iotload_types::{
    AccountId, Identity, Network, Operation, SequenceNumber, TransactionEnvelope,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const PASSPHRASE: &str = "Test Network ; iotload";
pub const READ_ENDPOINT: &str = "http://read-1:8000";
pub const CORE_ENDPOINT: &str = "http://core-1:11626";
pub const CORE_DOWN: &str = "http://core-down:11626";

#[derive(Default)]
struct LedgerState {
    /// Account id to last used sequence.
    accounts: HashMap<AccountId, i64>,
    /// Sequences of accepted log transactions, per source account.
    received: HashMap<AccountId, Vec<i64>>,
    accounts_created: usize,
    funding_submissions: usize,
    core_submissions: usize,
    ledger: u64,
}

/// A single-node ledger that applies transactions in arrival order and
/// enforces strict per-account sequencing.
///
/// Log submissions can be given a delay before they reach the ledger, so
/// concurrent submissions may arrive in a different order than they were sent.
pub struct MockLedger {
    network: Network,
    state: Mutex<LedgerState>,
    unreachable: HashSet<String>,
    underfunded: bool,
    jitter: Vec<Duration>,
    core_calls: AtomicUsize,
}

impl MockLedger {
    /// A ledger whose network root account exists and is funded.
    pub fn genesis() -> Self {
        let ledger = Self {
            network: Network::new(PASSPHRASE),
            state: Mutex::new(LedgerState::default()),
            unreachable: HashSet::new(),
            underfunded: false,
            jitter: Vec::new(),
            core_calls: AtomicUsize::new(0),
        };
        ledger.insert_account(Identity::network_root(PASSPHRASE).account_id(), 0);
        ledger
    }

    /// Refuse connections to `endpoint`.
    pub fn with_unreachable(mut self, endpoint: &str) -> Self {
        self.unreachable.insert(endpoint.to_string());
        self
    }

    /// Fail every create-account operation with `op_underfunded`.
    pub fn underfunded(mut self) -> Self {
        self.underfunded = true;
        self
    }

    /// Delay each log submission before it is applied, cycling through
    /// `delays` in call order.
    pub fn with_jitter(mut self, delays: &[Duration]) -> Self {
        self.jitter = delays.to_vec();
        self
    }

    pub fn insert_account(&self, account: AccountId, sequence: i64) {
        self.state.lock().accounts.insert(account, sequence);
    }

    /// Advance an account's sequence out from under the spammer.
    pub fn bump_sequence(&self, account: &AccountId) {
        if let Some(sequence) = self.state.lock().accounts.get_mut(account) {
            *sequence += 1;
        }
    }

    pub fn account_exists(&self, account: &AccountId) -> bool {
        self.state.lock().accounts.contains_key(account)
    }

    pub fn sequence(&self, account: &AccountId) -> Option<i64> {
        self.state.lock().accounts.get(account).copied()
    }

    /// Sequences of accepted log transactions from `account`, in arrival order.
    pub fn received(&self, account: &AccountId) -> Vec<i64> {
        self.state
            .lock()
            .received
            .get(account)
            .cloned()
            .unwrap_or_default()
    }

    pub fn accounts_created(&self) -> usize {
        self.state.lock().accounts_created
    }

    pub fn funding_submissions(&self) -> usize {
        self.state.lock().funding_submissions
    }

    pub fn core_submissions(&self) -> usize {
        self.state.lock().core_submissions
    }

    fn check_reachable(&self, endpoint: &str) -> Result<(), ClientError> {
        if self.unreachable.contains(endpoint) {
            return Err(ClientError::Transport {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    /// Validate signature and sequence, consuming the sequence on success.
    fn check_source(
        &self,
        state: &mut LedgerState,
        envelope: &TransactionEnvelope,
    ) -> Result<(), ClientError> {
        let tx = &envelope.tx;
        if !envelope.is_signed_by(&self.network, &tx.source) {
            return Err(rejected(None, "tx_bad_auth"));
        }
        let current = state
            .accounts
            .get_mut(&tx.source)
            .ok_or_else(|| rejected(None, "tx_no_source_account"))?;
        if tx.sequence.get() != *current + 1 {
            return Err(ClientError::SequenceConflict {
                detail: TX_BAD_SEQ.to_string(),
            });
        }
        *current = tx.sequence.get();
        Ok(())
    }
}

fn rejected(operations: Option<Vec<String>>, transaction: &str) -> ClientError {
    ClientError::from_problem(
        400,
        Problem {
            title: "Transaction Failed".to_string(),
            detail: None,
            extras: Some(ProblemExtras {
                result_codes: Some(ResultCodes {
                    transaction: Some(transaction.to_string()),
                    operations: operations.unwrap_or_default(),
                }),
            }),
        },
    )
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn load_account(
        &self,
        endpoint: &str,
        account: &AccountId,
    ) -> Result<AccountInfo, ClientError> {
        self.check_reachable(endpoint)?;
        match self.sequence(account) {
            Some(sequence) => Ok(AccountInfo {
                id: *account,
                sequence: SequenceNumber(sequence),
            }),
            None => Err(ClientError::Unknown {
                status: 404,
                detail: "Resource Missing".to_string(),
            }),
        }
    }

    async fn submit_transaction(
        &self,
        endpoint: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<SubmitTransactionResponse, ClientError> {
        self.check_reachable(endpoint)?;
        let mut state = self.state.lock();
        state.funding_submissions += 1;
        self.check_source(&mut state, envelope)?;

        let mut codes = Vec::new();
        let mut created = Vec::new();
        for op in &envelope.tx.operations {
            let code = match op {
                Operation::CreateAccount { destination, .. } => {
                    if self.underfunded {
                        "op_underfunded"
                    } else if state.accounts.contains_key(destination) {
                        OP_ALREADY_EXISTS
                    } else {
                        created.push(*destination);
                        "op_success"
                    }
                }
                Operation::Payment { .. } => "op_success",
            };
            codes.push(code.to_string());
        }

        if codes.iter().any(|code| code != "op_success") {
            return Err(rejected(Some(codes), "tx_failed"));
        }

        state.ledger += 1;
        let starting_sequence = (state.ledger as i64) << 32;
        for account in created {
            state.accounts.insert(account, starting_sequence);
            state.accounts_created += 1;
        }

        let hash = envelope
            .tx
            .hash(&self.network)
            .map_err(|e| ClientError::Encoding(e.to_string()))?;
        Ok(SubmitTransactionResponse {
            hash: hash.to_hex(),
            ledger: Some(state.ledger),
            successful: true,
        })
    }

    async fn submit_to_core(
        &self,
        endpoint: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<CoreSubmission, ClientError> {
        self.check_reachable(endpoint)?;
        let call = self.core_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.jitter.get(call % self.jitter.len().max(1)) {
            tokio::time::sleep(*delay).await;
        }
        {
            let mut state = self.state.lock();
            state.core_submissions += 1;
            self.check_source(&mut state, envelope)?;
            state
                .received
                .entry(envelope.tx.source)
                .or_default()
                .push(envelope.tx.sequence.get());
        }
        // Let other workers interleave after the transaction is queued.
        tokio::task::yield_now().await;

        Ok(CoreSubmission::pending(200))
    }
}

/// A config for the mock ledger with no delays.
pub fn test_config(collection: &Identity, devices: usize) -> SpammerConfig {
    SpammerConfig::new(
        PASSPHRASE,
        vec![READ_ENDPOINT.to_string()],
        vec![CORE_ENDPOINT.to_string()],
        collection.secret(),
    )
    .with_devices(devices)
    .with_batch_delay(Duration::ZERO)
    .with_settle_delay(Duration::ZERO)
    .with_pool_size(4)
}
