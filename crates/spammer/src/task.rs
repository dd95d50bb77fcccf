//! Log transaction tasks and their execution.
//!
//! A [`DispatchTask`] carries everything a worker needs to build, sign and
//! submit one log transaction, including the sequence number the dispatcher
//! reserved for it. Workers never consult the sequence ledger.

use crate::client::{ClientError, CoreSubmission, LedgerClient};
use iotload_types::{
    Account, AccountId, Amount, BatchIndex, BuildError, DeviceId, EncodingError, Identity, Memo,
    Network, Operation, SecretSeed, SequenceNumber, TransactionBuilder, TransactionEnvelope,
    MAX_MEMO_TEXT_LEN,
};
use std::time::{Duration, Instant};
use tracing::trace;

/// One log transaction to be built and submitted by a worker.
#[derive(Clone, Debug)]
pub struct DispatchTask {
    /// Tick this task was emitted in.
    pub batch: BatchIndex,
    pub device: DeviceId,
    /// Source account of the transaction.
    pub account: AccountId,
    /// Sequence reserved for this task. The transaction carries the next one.
    pub account_sequence: SequenceNumber,
    /// Collection account receiving the payment.
    pub destination: AccountId,
    /// Submission endpoint chosen for this task.
    pub endpoint: String,
    /// Signing secret of the source account.
    pub secret: SecretSeed,
}

impl DispatchTask {
    /// Memo identifying the tick and device: batch index followed by device
    /// index, zero-padded, truncated to the memo limit.
    pub fn memo(&self) -> String {
        let mut memo = format!("{:02}{:03}", self.batch.0, self.device.0);
        memo.truncate(MAX_MEMO_TEXT_LEN);
        memo
    }

    /// Build and sign the payment envelope for this task.
    pub fn build_envelope(&self, context: &WorkerContext) -> Result<TransactionEnvelope, TaskError> {
        let mut source = Account::new(self.account, self.account_sequence);
        let tx = TransactionBuilder::new(&mut source, context.base_fee)
            .add_operation(Operation::Payment {
                destination: self.destination,
                amount: context.payment_amount,
            })
            .add_memo(Memo::Text(self.memo()))
            .build()?;

        let mut envelope = TransactionEnvelope::new(tx);
        envelope.sign(&context.network, &Identity::from_secret(&self.secret))?;
        Ok(envelope)
    }
}

/// Immutable settings shared by every worker.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    pub network: Network,
    pub base_fee: u32,
    pub payment_amount: Amount,
}

/// Outcome of one executed task, as reported to the completion tracker.
#[derive(Debug)]
pub struct WorkerResult {
    pub batch: BatchIndex,
    pub device: DeviceId,
    pub endpoint: String,
    /// Time from build start to endpoint response.
    pub latency: Duration,
    pub outcome: Result<CoreSubmission, TaskError>,
}

impl WorkerResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_sequence_conflict(&self) -> bool {
        matches!(&self.outcome, Err(TaskError::Client(e)) if e.is_sequence_conflict())
    }
}

/// Errors executing a single task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Failed to build transaction: {0}")]
    Build(#[from] BuildError),

    #[error("Failed to sign transaction: {0}")]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Build, sign and submit one task. Never retries.
pub async fn execute_task<C: LedgerClient + ?Sized>(
    task: &DispatchTask,
    client: &C,
    context: &WorkerContext,
) -> WorkerResult {
    let started = Instant::now();
    let outcome = match task.build_envelope(context) {
        Ok(envelope) => {
            trace!(
                batch = %task.batch,
                device = %task.device,
                sequence = envelope.tx.sequence.get(),
                endpoint = %task.endpoint,
                "Submitting log transaction"
            );
            client
                .submit_to_core(&task.endpoint, &envelope)
                .await
                .map_err(TaskError::from)
        }
        Err(e) => Err(e),
    };

    WorkerResult {
        batch: task.batch,
        device: task.device,
        endpoint: task.endpoint.clone(),
        latency: started.elapsed(),
        outcome,
    }
}
