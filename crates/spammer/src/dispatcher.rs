//! Rate-governed batch dispatcher.
//!
//! The dispatcher is the only writer of the [`SequenceLedger`]. On each tick
//! it walks the device accounts in their fixed order, reserves one sequence
//! number per account and hands the resulting task to the worker pool. It
//! never waits for a task to complete, only for room in the account's intake
//! lane. The lane's single worker keeps that account's submissions in order.

use crate::client::EndpointSet;
use crate::pool::Intake;
use crate::sequence::{SequenceError, SequenceLedger};
use crate::task::DispatchTask;
use iotload_types::{AccountId, BatchIndex, DeviceId, Identity};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::{debug, info};

/// A provisioned device and the identity controlling its account.
#[derive(Clone, Debug)]
pub struct DeviceAccount {
    pub device: DeviceId,
    pub identity: Identity,
}

/// Totals for a completed dispatch loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub batches: u64,
    pub tasks: u64,
}

/// Sleep between task emissions for a per-task rate, if any.
///
/// A rate of zero (or below) disables pacing, as does a rate whose interval
/// does not fit in a [`Duration`]. Configuration validation rejects the latter.
pub fn pacing_interval(rate: f64) -> Option<Duration> {
    if rate.is_finite() && rate > 0.0 {
        Duration::try_from_secs_f64(1.0 / rate).ok()
    } else {
        None
    }
}

/// Emits batches of log tasks.
pub struct Dispatcher {
    batches: u64,
    batch_delay: Duration,
    task_interval: Option<Duration>,
    endpoints: EndpointSet,
    destination: AccountId,
    rng: ChaCha8Rng,
}

impl Dispatcher {
    /// Create a dispatcher emitting `batches` ticks of payments to `destination`.
    pub fn new(batches: u64, endpoints: EndpointSet, destination: AccountId) -> Self {
        Self {
            batches,
            batch_delay: Duration::ZERO,
            task_interval: None,
            endpoints,
            destination,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Sleep between ticks.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Per-task emission rate within a tick (tasks/sec, 0 = unpaced).
    pub fn with_task_rate(mut self, rate: f64) -> Self {
        self.task_interval = pacing_interval(rate);
        self
    }

    /// Seed endpoint selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Total tasks this dispatcher will emit for `accounts` devices.
    pub fn total_tasks(&self, accounts: usize) -> u64 {
        self.batches.saturating_mul(accounts as u64)
    }

    /// Run every tick, handing tasks to `intake`.
    ///
    /// Returns once the last tick has been emitted. A failed sequence
    /// reservation or a closed intake aborts the loop.
    pub async fn run(
        &mut self,
        ledger: &SequenceLedger,
        devices: &[DeviceAccount],
        intake: &Intake,
    ) -> Result<DispatchSummary, DispatchError> {
        let mut summary = DispatchSummary::default();
        info!(
            batches = self.batches,
            devices = devices.len(),
            batch_delay_ms = self.batch_delay.as_millis() as u64,
            task_interval_ms = self.task_interval.map(|d| d.as_millis() as u64),
            "Starting dispatch"
        );

        for batch in 0..self.batches {
            let batch = BatchIndex(batch);
            for (position, device) in devices.iter().enumerate() {
                if position > 0 {
                    if let Some(interval) = self.task_interval {
                        tokio::time::sleep(interval).await;
                    }
                }

                let account = device.identity.account_id();
                let account_sequence = ledger.reserve(&account)?;
                let task = DispatchTask {
                    batch,
                    device: device.device,
                    account,
                    account_sequence,
                    destination: self.destination,
                    endpoint: self.endpoints.choose(&mut self.rng).to_string(),
                    secret: device.identity.secret(),
                };
                debug!(
                    %batch,
                    device = %device.device,
                    sequence = account_sequence.get(),
                    endpoint = %task.endpoint,
                    "Dispatching task"
                );
                intake
                    .send(task)
                    .await
                    .map_err(|_| DispatchError::PoolClosed)?;
                summary.tasks += 1;
            }

            summary.batches += 1;
            info!(%batch, tasks = devices.len(), "Batch dispatched");

            if summary.batches < self.batches && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        Ok(summary)
    }
}

/// Errors that abort dispatching.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Sequence reservation failed: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Worker pool intake closed")]
    PoolClosed,
}
