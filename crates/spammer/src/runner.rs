//! Spammer runner: provisioning, dispatch and completion in one run.

use crate::client::{AccountInfo, ClientError, EndpointSet, HttpLedgerClient, LedgerClient};
use crate::config::{ConfigError, SpammerConfig};
use crate::dispatcher::{DeviceAccount, DispatchError, Dispatcher};
use crate::identity::{generate_identities, generate_identities_from_seed};
use crate::metrics::{LatencyRecorder, SpammerReport};
use crate::pool::WorkerPool;
use crate::provisioner::{AccountProvisioner, FundingStatus, ProvisionError};
use crate::sequence::{SequenceError, SequenceLedger};
use crate::task::{WorkerContext, WorkerResult};
use crate::tracker::CompletionTracker;
use futures::future::try_join_all;
use iotload_types::{AccountId, DeviceId, Identity};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Drives one complete spammer run against a ledger network.
pub struct Spammer<C: LedgerClient = HttpLedgerClient> {
    config: SpammerConfig,
    client: Arc<C>,
    read_endpoints: EndpointSet,
    submit_endpoints: EndpointSet,
    rng: ChaCha8Rng,
}

impl Spammer<HttpLedgerClient> {
    /// Create a spammer talking HTTP to the configured endpoints.
    pub fn new(config: SpammerConfig) -> Result<Self, SpammerError> {
        let client = HttpLedgerClient::new(config.request_timeout)?;
        Self::with_client(config, Arc::new(client))
    }
}

impl<C: LedgerClient> Spammer<C> {
    /// Create a spammer using the given ledger client.
    pub fn with_client(config: SpammerConfig, client: Arc<C>) -> Result<Self, SpammerError> {
        config.validate()?;
        let read_endpoints = EndpointSet::new(config.read_endpoints.clone())
            .ok_or(ConfigError::Missing("read endpoints"))?;
        let submit_endpoints = EndpointSet::new(config.submit_endpoints.clone())
            .ok_or(ConfigError::Missing("submit endpoints"))?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Ok(Self {
            config,
            client,
            read_endpoints,
            submit_endpoints,
            rng,
        })
    }

    pub fn config(&self) -> &SpammerConfig {
        &self.config
    }

    /// Run to completion and return the report.
    ///
    /// Provisioning failures abort before any log transaction is dispatched.
    /// Task failures are counted in the report and never abort the run.
    pub async fn run(&mut self) -> Result<SpammerReport, SpammerError> {
        let identities = match self.config.seed {
            Some(seed) => generate_identities_from_seed(self.config.devices, seed),
            None => generate_identities(self.config.devices),
        };
        let collection = self.config.collection_identity();

        let (accounts_created, accounts_existing) =
            self.provision(&collection, &identities).await?;

        if !self.config.settle_delay.is_zero() {
            info!(
                delay_ms = self.config.settle_delay.as_millis() as u64,
                "Waiting for funding to settle"
            );
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let ledger = self.seed_ledger(&identities).await?;
        let devices: Vec<DeviceAccount> = identities
            .into_iter()
            .enumerate()
            .map(|(index, identity)| DeviceAccount {
                device: DeviceId(index as u32),
                identity,
            })
            .collect();

        let batches = self.config.run_length.batches_for(devices.len());
        let mut dispatcher = Dispatcher::new(
            batches,
            self.submit_endpoints.clone(),
            collection.account_id(),
        )
        .with_batch_delay(self.config.batch_delay)
        .with_task_rate(self.config.task_rate)
        .with_seed(self.next_seed());

        let total = dispatcher.total_tasks(devices.len());
        let tracker = Arc::new(CompletionTracker::new(total));
        let context = Arc::new(WorkerContext {
            network: self.config.network.clone(),
            base_fee: self.config.base_fee,
            payment_amount: self.config.payment_amount,
        });
        let (pool, intake, results) = WorkerPool::spawn(
            self.config.pool_size,
            Arc::clone(&self.client),
            context,
            Arc::clone(&tracker),
        );
        let aggregator = tokio::spawn(aggregate_latencies(results));

        info!(
            devices = devices.len(),
            batches,
            total,
            pool_size = pool.size(),
            "Starting log dispatch"
        );
        let started = Instant::now();
        let dispatched = dispatcher.run(&ledger, &devices, &intake).await;
        drop(intake);

        let summary = match dispatched {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Dispatch aborted");
                pool.shutdown().await;
                return Err(e.into());
            }
        };

        tracker.wait_complete().await;
        let elapsed = started.elapsed();
        pool.shutdown().await;

        let recorder = aggregator
            .await
            .map_err(|e| SpammerError::Aggregation(e.to_string()))??;

        let mut report = SpammerReport::from_tracker(
            &tracker,
            summary.tasks,
            summary.batches,
            recorder.summary(),
            elapsed,
        );
        report.devices = devices.len();
        report.accounts_created = accounts_created;
        report.accounts_existing = accounts_existing;

        if report.sequence_conflicts > 0 {
            error!(
                conflicts = report.sequence_conflicts,
                "Run finished with sequence conflicts"
            );
        } else {
            info!(
                succeeded = report.succeeded,
                failed = report.failed,
                "Run finished"
            );
        }
        Ok(report)
    }

    /// Fund the collection account, then every device account.
    ///
    /// Returns (created, already existing) device account counts.
    async fn provision(
        &mut self,
        collection: &Identity,
        identities: &[Identity],
    ) -> Result<(usize, usize), SpammerError> {
        let funder = self.config.funding_identity();
        let funding = self.load_account(funder.account_id()).await?;
        info!(
            funder = %funder.account_id(),
            sequence = funding.sequence.get(),
            "Loaded funding account"
        );

        let mut provisioner = AccountProvisioner::new(
            Arc::clone(&self.client),
            self.config.network.clone(),
            funder,
            funding.sequence,
            self.read_endpoints.clone(),
        )
        .with_starting_balance(self.config.starting_balance)
        .with_base_fee(self.config.base_fee)
        .with_seed(self.next_seed());

        provisioner.provision(&[collection.account_id()]).await?;

        let accounts: Vec<AccountId> = identities.iter().map(Identity::account_id).collect();
        let outcomes = provisioner.provision(&accounts).await?;

        let (mut created, mut existing) = (0, 0);
        for outcome in &outcomes {
            match outcome.status {
                FundingStatus::Created => created += outcome.accounts.len(),
                FundingStatus::AlreadyFunded => existing += outcome.accounts.len(),
            }
        }
        info!(
            batches = outcomes.len(),
            created,
            existing,
            "Provisioned device accounts"
        );
        Ok((created, existing))
    }

    /// Load every device account concurrently and seed the sequence ledger.
    async fn seed_ledger(&mut self, identities: &[Identity]) -> Result<SequenceLedger, SpammerError> {
        let loads: Vec<_> = identities
            .iter()
            .map(|identity| {
                let endpoint = self.read_endpoints.choose(&mut self.rng).to_string();
                let client = Arc::clone(&self.client);
                let account = identity.account_id();
                async move {
                    client
                        .load_account(&endpoint, &account)
                        .await
                        .map_err(|source| SpammerError::LoadAccount { account, source })
                }
            })
            .collect();
        let infos: Vec<AccountInfo> = try_join_all(loads).await?;

        info!(accounts = infos.len(), "Loaded device accounts");
        Ok(SequenceLedger::seed(
            infos.into_iter().map(|info| (info.id, info.sequence)),
        )?)
    }

    async fn load_account(&mut self, account: AccountId) -> Result<AccountInfo, SpammerError> {
        let endpoint = self.read_endpoints.choose(&mut self.rng).to_string();
        self.client
            .load_account(&endpoint, &account)
            .await
            .map_err(|source| SpammerError::LoadAccount { account, source })
    }

    fn next_seed(&mut self) -> u64 {
        use rand::RngCore;
        self.rng.next_u64()
    }
}

async fn aggregate_latencies(
    mut results: mpsc::UnboundedReceiver<WorkerResult>,
) -> Result<LatencyRecorder, SpammerError> {
    let mut recorder =
        LatencyRecorder::new().map_err(|e| SpammerError::Aggregation(e.to_string()))?;
    while let Some(result) = results.recv().await {
        recorder.record(result.latency);
    }
    Ok(recorder)
}

/// Errors that abort a spammer run.
#[derive(Debug, thiserror::Error)]
pub enum SpammerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load account {account}: {source}")]
    LoadAccount {
        account: AccountId,
        #[source]
        source: ClientError,
    },

    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Result aggregation failed: {0}")]
    Aggregation(String),

    #[error("{0} log transactions hit sequence conflicts")]
    SequenceConflicts(u64),
}
