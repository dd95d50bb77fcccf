//! IoT Log Spammer CLI
//!
//! A command-line tool for driving synthetic log traffic at a ledger network.

use clap::{Args, Parser, Subcommand};
use iotload_spammer::config::{default_pool_size, ConfigError, SpammerConfig};
use iotload_spammer::keygen::generate_keys_toml;
use iotload_spammer::runner::Spammer;
use iotload_spammer::RunLength;
use iotload_types::{Amount, SecretSeed};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "iotload-spammer")]
#[command(about = "Synthetic IoT log workload for ledger networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate identities (account + secret) as TOML
    Keygen {
        /// Number of identities
        #[arg(long, default_value = "1")]
        count: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Provision device accounts and run the log workload
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Load all settings from a TOML file; other flags are ignored
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network passphrase the transactions are signed for
    #[arg(long, env = "NETWORK_PASSPHRASE", required_unless_present = "config")]
    passphrase: Option<String>,

    /// Account read / funding endpoints (comma-separated)
    #[arg(long, env = "READ_ENDPOINTS", value_delimiter = ',', required_unless_present = "config")]
    read_endpoints: Vec<String>,

    /// Log submission endpoints (comma-separated)
    #[arg(long, env = "SUBMIT_ENDPOINTS", value_delimiter = ',', required_unless_present = "config")]
    submit_endpoints: Vec<String>,

    /// Secret of the collection account
    #[arg(long, env = "COLLECTION_SECRET", required_unless_present = "config")]
    collection_secret: Option<SecretSeed>,

    /// Secret of the funding account (defaults to the network root)
    #[arg(long, env = "FUNDING_SECRET")]
    funding_secret: Option<SecretSeed>,

    /// Number of simulated devices
    #[arg(long, env = "DEVICES", required_unless_present = "config")]
    devices: Option<usize>,

    /// Number of batches to emit
    #[arg(long, env = "BATCHES", conflicts_with = "total_rate")]
    batches: Option<u64>,

    /// Target total transactions per second across all devices
    #[arg(long, env = "TOTAL_RATE", requires = "run_duration")]
    total_rate: Option<f64>,

    /// Run duration for --total-rate (e.g., "30s", "5m")
    #[arg(long, env = "RUN_DURATION")]
    run_duration: Option<humantime::Duration>,

    /// Delay between batches
    #[arg(long, env = "BATCH_DELAY", required_unless_present = "config")]
    batch_delay: Option<humantime::Duration>,

    /// Per-task emission rate within a batch (0 = unpaced)
    #[arg(long, env = "TASK_RATE", required_unless_present = "config")]
    task_rate: Option<f64>,

    /// Number of concurrent workers
    #[arg(long, env = "POOL_SIZE")]
    pool_size: Option<usize>,

    /// Starting balance for new device accounts, in whole units
    #[arg(long, default_value = "100")]
    starting_balance: i64,

    /// Wait after provisioning before loading accounts
    #[arg(long, default_value = "1s")]
    settle_delay: humantime::Duration,

    /// HTTP request timeout
    #[arg(long, default_value = "30s")]
    timeout: humantime::Duration,

    /// Seed for identities and endpoint selection
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    /// Resolve the run configuration from the file or the flags.
    fn into_config(self) -> Result<SpammerConfig, ConfigError> {
        if let Some(path) = self.config {
            return SpammerConfig::from_toml_file(path);
        }

        let run_length = match (self.batches, self.total_rate, self.run_duration) {
            (_, Some(total_rate), Some(duration)) => RunLength::TargetRate {
                total_rate,
                duration: *duration,
            },
            (Some(batches), _, _) => RunLength::Batches(batches),
            _ => return Err(ConfigError::Missing("--batches or --total-rate")),
        };

        let mut config = SpammerConfig::new(
            self.passphrase.ok_or(ConfigError::Missing("--passphrase"))?,
            self.read_endpoints,
            self.submit_endpoints,
            self.collection_secret
                .ok_or(ConfigError::Missing("--collection-secret"))?,
        )
        .with_devices(self.devices.ok_or(ConfigError::Missing("--devices"))?)
        .with_run_length(run_length)
        .with_batch_delay(*self.batch_delay.ok_or(ConfigError::Missing("--batch-delay"))?)
        .with_task_rate(self.task_rate.ok_or(ConfigError::Missing("--task-rate"))?)
        .with_pool_size(self.pool_size.unwrap_or_else(default_pool_size))
        .with_starting_balance(Amount::from_units(self.starting_balance))
        .with_settle_delay(*self.settle_delay)
        .with_request_timeout(*self.timeout);

        if let Some(secret) = self.funding_secret {
            config = config.with_funding_secret(secret);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { count, seed } => {
            // Don't initialize tracing for keygen - output goes to stdout
            let toml = generate_keys_toml(count, seed)?;
            print!("{}", toml);
        }

        Commands::Run(args) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();

            let config = args.into_config()?;
            let mut spammer = Spammer::new(config)?;
            let report = spammer.run().await?;
            report.print();
            report.check()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotload_types::Identity;

    fn run_args(extra: &[&str]) -> Result<RunArgs, clap::Error> {
        let secret = Identity::generate().secret().to_string();
        let mut argv = vec![
            "iotload-spammer",
            "run",
            "--passphrase",
            "Test Network",
            "--read-endpoints",
            "http://read-1:8000",
            "--submit-endpoints",
            "http://core-1:11626",
            "--collection-secret",
            secret.as_str(),
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv)?.command {
            Commands::Run(args) => Ok(args),
            Commands::Keygen { .. } => unreachable!(),
        }
    }

    #[test]
    fn test_complete_flags_build_a_config() {
        let config = run_args(&[
            "--devices",
            "4",
            "--batches",
            "3",
            "--batch-delay",
            "250ms",
            "--task-rate",
            "0",
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(config.devices, 4);
        assert_eq!(config.run_length, RunLength::Batches(3));
        assert_eq!(config.batch_delay, std::time::Duration::from_millis(250));
        assert_eq!(config.task_rate, 0.0);
    }

    #[test]
    fn test_missing_pacing_flags_rejected() {
        for missing in ["--devices", "--batch-delay", "--task-rate"] {
            let mut flags = vec![
                "--devices",
                "4",
                "--batches",
                "3",
                "--batch-delay",
                "1s",
                "--task-rate",
                "0",
            ];
            let at = flags.iter().position(|f| *f == missing).unwrap();
            flags.drain(at..at + 2);
            assert!(run_args(&flags).is_err(), "{} should be required", missing);
        }
    }

    #[test]
    fn test_missing_run_length_rejected() {
        let args = run_args(&["--devices", "4", "--batch-delay", "1s", "--task-rate", "0"]).unwrap();
        assert!(matches!(
            args.into_config(),
            Err(ConfigError::Missing(_))
        ));
    }
}
