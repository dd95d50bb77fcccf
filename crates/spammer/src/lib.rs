//! Synthetic IoT log workload for ledger networks.
//!
//! Simulates a fleet of devices that each write log records to the ledger
//! as minimal payments to a shared collection account. A run:
//!
//! - Generates device identities
//! - Funds their accounts from a funding account (idempotently)
//! - Seeds a per-account sequence ledger from on-chain state
//! - Dispatches paced batches of log transactions to a worker pool
//! - Tracks completion and reports throughput and latency

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod idempotent;
pub mod identity;
pub mod keygen;
pub mod metrics;
pub mod pool;
pub mod provisioner;
pub mod runner;
pub mod sequence;
pub mod task;
pub mod tracker;

pub use config::{RunLength, SpammerConfig};
pub use metrics::SpammerReport;
pub use runner::{Spammer, SpammerError};
