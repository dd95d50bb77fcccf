//! Account provisioning.
//!
//! Funds device accounts from a single funding account, batching up to
//! [`MAX_OPS_PER_TX`] create-account operations per transaction. Batches are
//! submitted sequentially; each one consumes one funding sequence number.

use crate::client::{ClientError, EndpointSet, LedgerClient};
use crate::idempotent::idempotent;
use iotload_types::{
    Account, AccountId, Amount, BuildError, EncodingError, Identity, Network, Operation,
    SequenceNumber, TransactionBuilder, TransactionEnvelope, BASE_FEE, MAX_OPS_PER_TX,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one funding batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Position of the batch within this provisioning call.
    pub batch: usize,
    /// Accounts covered by the batch.
    pub accounts: Vec<AccountId>,
    pub status: FundingStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FundingStatus {
    /// The accounts were created by this batch.
    Created,
    /// The network reported the accounts already exist.
    AlreadyFunded,
}

/// Creates and funds accounts from a funding identity.
pub struct AccountProvisioner<C: LedgerClient> {
    client: Arc<C>,
    network: Network,
    funder: Identity,
    funding_account: Account,
    endpoints: EndpointSet,
    starting_balance: Amount,
    base_fee: u32,
    rng: ChaCha8Rng,
}

impl<C: LedgerClient> AccountProvisioner<C> {
    /// Create a provisioner.
    ///
    /// `funding_sequence` must be the funding account's authoritative
    /// on-chain sequence number.
    pub fn new(
        client: Arc<C>,
        network: Network,
        funder: Identity,
        funding_sequence: SequenceNumber,
        endpoints: EndpointSet,
    ) -> Self {
        let funding_account = Account::new(funder.account_id(), funding_sequence);
        Self {
            client,
            network,
            funder,
            funding_account,
            endpoints,
            starting_balance: Amount::from_units(100),
            base_fee: BASE_FEE,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Set the balance each new account receives.
    pub fn with_starting_balance(mut self, balance: Amount) -> Self {
        self.starting_balance = balance;
        self
    }

    /// Set the per-operation fee.
    pub fn with_base_fee(mut self, fee: u32) -> Self {
        self.base_fee = fee;
        self
    }

    /// Seed endpoint selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// The funding account's locally tracked sequence number.
    pub fn funding_sequence(&self) -> SequenceNumber {
        self.funding_account.sequence()
    }

    /// Fund every account in `accounts`.
    ///
    /// Batches whose accounts already exist count as funded. Any other
    /// failure stops provisioning and is returned; later batches are not
    /// attempted.
    pub async fn provision(
        &mut self,
        accounts: &[AccountId],
    ) -> Result<Vec<BatchOutcome>, ProvisionError> {
        let mut outcomes = Vec::with_capacity(accounts.len().div_ceil(MAX_OPS_PER_TX));

        for (batch, chunk) in accounts.chunks(MAX_OPS_PER_TX).enumerate() {
            let envelope = self.funding_envelope(chunk)?;
            let endpoint = self.endpoints.choose(&mut self.rng).to_string();

            let submitted = idempotent(self.client.submit_transaction(&endpoint, &envelope))
                .await
                .map_err(|source| ProvisionError::Submit { batch, source })?;

            let status = match submitted {
                Some(response) => {
                    info!(
                        batch,
                        accounts = chunk.len(),
                        hash = %response.hash,
                        ledger = response.ledger,
                        "Funded accounts"
                    );
                    FundingStatus::Created
                }
                None => {
                    warn!(batch, accounts = chunk.len(), "Accounts already funded");
                    FundingStatus::AlreadyFunded
                }
            };

            outcomes.push(BatchOutcome {
                batch,
                accounts: chunk.to_vec(),
                status,
            });
        }

        Ok(outcomes)
    }

    /// Build and sign one create-account batch, advancing the funding sequence.
    fn funding_envelope(
        &mut self,
        chunk: &[AccountId],
    ) -> Result<TransactionEnvelope, ProvisionError> {
        let mut builder = TransactionBuilder::new(&mut self.funding_account, self.base_fee);
        for destination in chunk {
            builder = builder.add_operation(Operation::CreateAccount {
                destination: *destination,
                starting_balance: self.starting_balance,
            });
        }
        let tx = builder.build()?;

        let mut envelope = TransactionEnvelope::new(tx);
        envelope.sign(&self.network, &self.funder)?;
        Ok(envelope)
    }
}

/// Provisioning failures. All are fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Failed to build funding transaction: {0}")]
    Build(#[from] BuildError),

    #[error("Failed to sign funding transaction: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Funding batch {batch} failed: {source}")]
    Submit {
        batch: usize,
        #[source]
        source: ClientError,
    },
}
