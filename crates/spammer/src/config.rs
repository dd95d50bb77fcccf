//! Spammer configuration.
//!
//! A [`SpammerConfig`] is built once at startup (from CLI flags, environment
//! variables or a TOML file), validated, and then passed by reference into
//! every component. Nothing downstream reads process state directly.

use iotload_types::{Amount, CryptoError, Identity, Network, SecretSeed, BASE_FEE};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How many ticks (batches) a run emits.
#[derive(Clone, Debug, PartialEq)]
pub enum RunLength {
    /// An explicit number of batches.
    Batches(u64),

    /// Enough batches to sustain `total_rate` transactions per second
    /// across all accounts for `duration`.
    TargetRate { total_rate: f64, duration: Duration },
}

impl RunLength {
    /// Number of batches to emit for the given number of accounts.
    pub fn batches_for(&self, accounts: usize) -> u64 {
        match self {
            RunLength::Batches(n) => *n,
            RunLength::TargetRate {
                total_rate,
                duration,
            } => {
                if accounts == 0 {
                    return 0;
                }
                let total = total_rate * duration.as_secs_f64();
                (total / accounts as f64).ceil().max(0.0) as u64
            }
        }
    }
}

/// Configuration for a spammer run.
#[derive(Clone, Debug)]
pub struct SpammerConfig {
    /// Ledger network the transactions are signed for.
    pub network: Network,

    /// Endpoints for account reads and funding submissions.
    pub read_endpoints: Vec<String>,

    /// Endpoints accepting `GET /tx?blob=` log submissions.
    pub submit_endpoints: Vec<String>,

    /// Secret of the collection account every log payment goes to.
    pub collection_secret: SecretSeed,

    /// Secret of the funding account. Defaults to the network root.
    pub funding_secret: Option<SecretSeed>,

    /// Number of simulated devices.
    pub devices: usize,

    /// How many batches to emit.
    pub run_length: RunLength,

    /// Sleep between batches.
    pub batch_delay: Duration,

    /// Per-task emission rate within a batch (tasks/sec). Zero disables pacing.
    pub task_rate: f64,

    /// Number of concurrent workers.
    pub pool_size: usize,

    /// Balance given to each newly created account.
    pub starting_balance: Amount,

    /// Amount paid by each log transaction.
    pub payment_amount: Amount,

    /// Per-operation fee in stroops.
    pub base_fee: u32,

    /// Wait after provisioning so the funding ledger can close.
    pub settle_delay: Duration,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    /// Seed for identity generation and endpoint selection.
    pub seed: Option<u64>,
}

impl SpammerConfig {
    /// Create a configuration with default pacing and sizing.
    pub fn new(
        network_passphrase: impl Into<String>,
        read_endpoints: Vec<String>,
        submit_endpoints: Vec<String>,
        collection_secret: SecretSeed,
    ) -> Self {
        Self {
            network: Network::new(network_passphrase),
            read_endpoints,
            submit_endpoints,
            collection_secret,
            funding_secret: None,
            devices: 10,
            run_length: RunLength::Batches(10),
            batch_delay: Duration::from_secs(1),
            task_rate: 0.0,
            pool_size: default_pool_size(),
            starting_balance: Amount::from_units(100),
            payment_amount: Amount::ONE_STROOP,
            base_fee: BASE_FEE,
            settle_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            seed: None,
        }
    }

    /// Set the funding account secret.
    pub fn with_funding_secret(mut self, secret: SecretSeed) -> Self {
        self.funding_secret = Some(secret);
        self
    }

    /// Set the number of simulated devices.
    pub fn with_devices(mut self, devices: usize) -> Self {
        self.devices = devices;
        self
    }

    /// Set the run length.
    pub fn with_run_length(mut self, run_length: RunLength) -> Self {
        self.run_length = run_length;
        self
    }

    /// Set the delay between batches.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Set the per-task emission rate (0 = unpaced).
    pub fn with_task_rate(mut self, rate: f64) -> Self {
        self.task_rate = rate;
        self
    }

    /// Set the worker pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the starting balance for provisioned accounts.
    pub fn with_starting_balance(mut self, balance: Amount) -> Self {
        self.starting_balance = balance;
        self
    }

    /// Set the wait between provisioning and account loading.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The identity funding new accounts.
    pub fn funding_identity(&self) -> Identity {
        match &self.funding_secret {
            Some(secret) => Identity::from_secret(secret),
            None => Identity::network_root(self.network.passphrase()),
        }
    }

    /// The identity owning the collection account.
    pub fn collection_identity(&self) -> Identity {
        Identity::from_secret(&self.collection_secret)
    }

    /// Check every setting. Called before any network traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.passphrase().is_empty() {
            return Err(ConfigError::Missing("network passphrase"));
        }
        validate_endpoints("read endpoints", &self.read_endpoints)?;
        validate_endpoints("submit endpoints", &self.submit_endpoints)?;

        if self.devices == 0 {
            return Err(ConfigError::invalid("devices", "must be at least 1"));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::invalid("pool size", "must be at least 1"));
        }
        if !self.task_rate.is_finite() || self.task_rate < 0.0 {
            return Err(ConfigError::invalid("task rate", "must be >= 0"));
        }
        if self.task_rate > 0.0 && Duration::try_from_secs_f64(1.0 / self.task_rate).is_err() {
            return Err(ConfigError::invalid("task rate", "too small to pace"));
        }
        if let RunLength::TargetRate {
            total_rate,
            duration,
        } = &self.run_length
        {
            if !total_rate.is_finite() || *total_rate <= 0.0 {
                return Err(ConfigError::invalid("total rate", "must be > 0"));
            }
            if duration.is_zero() {
                return Err(ConfigError::invalid("run duration", "must be > 0"));
            }
        }
        if self.starting_balance.stroops() <= 0 || self.payment_amount.stroops() <= 0 {
            return Err(ConfigError::invalid("amounts", "must be positive"));
        }
        Ok(())
    }

    /// Load and validate a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a configuration from TOML text.
    ///
    /// ```toml
    /// network_passphrase = "Standalone Network ; February 2017"
    /// read_endpoints = ["http://localhost:8000"]
    /// submit_endpoints = ["http://localhost:11626"]
    /// collection_secret = "S..."
    /// devices = 50
    /// batches = 20            # or: total_rate = 200.0 + run_duration = "60s"
    /// batch_delay = "1s"
    /// task_rate = 0.0
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        let config = file.into_config()?;
        config.validate()?;
        Ok(config)
    }
}

/// Default worker count: a small multiple of the available cores.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 4)
        .unwrap_or(4)
}

fn validate_endpoints(field: &'static str, endpoints: &[String]) -> Result<(), ConfigError> {
    if endpoints.is_empty() {
        return Err(ConfigError::Missing(field));
    }
    for endpoint in endpoints {
        let url = reqwest::Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
    }
    Ok(())
}

/// On-disk shape of the configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    network_passphrase: String,
    read_endpoints: Vec<String>,
    submit_endpoints: Vec<String>,
    collection_secret: String,
    funding_secret: Option<String>,
    devices: usize,
    batches: Option<u64>,
    total_rate: Option<f64>,
    run_duration: Option<String>,
    batch_delay: String,
    task_rate: f64,
    pool_size: Option<usize>,
    starting_balance: Option<i64>,
    settle_delay: Option<String>,
    request_timeout: Option<String>,
    seed: Option<u64>,
}

impl FileConfig {
    fn into_config(self) -> Result<SpammerConfig, ConfigError> {
        let run_length = match (self.batches, self.total_rate, self.run_duration) {
            (Some(batches), _, _) => RunLength::Batches(batches),
            (None, Some(total_rate), Some(duration)) => RunLength::TargetRate {
                total_rate,
                duration: parse_duration("run_duration", &duration)?,
            },
            _ => return Err(ConfigError::Missing("batches or total_rate + run_duration")),
        };

        let mut config = SpammerConfig::new(
            self.network_passphrase,
            self.read_endpoints,
            self.submit_endpoints,
            self.collection_secret.parse()?,
        )
        .with_devices(self.devices)
        .with_run_length(run_length)
        .with_batch_delay(parse_duration("batch_delay", &self.batch_delay)?)
        .with_task_rate(self.task_rate);

        if let Some(secret) = self.funding_secret {
            config = config.with_funding_secret(secret.parse()?);
        }
        if let Some(size) = self.pool_size {
            config = config.with_pool_size(size);
        }
        if let Some(units) = self.starting_balance {
            config = config.with_starting_balance(Amount::from_units(units));
        }
        if let Some(delay) = self.settle_delay {
            config = config.with_settle_delay(parse_duration("settle_delay", &delay)?);
        }
        if let Some(timeout) = self.request_timeout {
            config = config.with_request_timeout(parse_duration("request_timeout", &timeout)?);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        Ok(config)
    }
}

fn parse_duration(field: &'static str, text: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(text).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

/// Configuration errors. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid secret: {0}")]
    Secret(#[from] CryptoError),

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
