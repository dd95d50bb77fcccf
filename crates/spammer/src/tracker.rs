//! Completion tracking for dispatched tasks.

use crate::task::WorkerResult;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-endpoint submission counters.
#[derive(Debug, Default)]
pub struct EndpointCounters {
    pub submitted: AtomicU64,
    pub failed: AtomicU64,
}

/// Counts finished tasks and signals exactly once when all are done.
///
/// Shared between workers. Every task is recorded exactly once, success or
/// failure; the signal fires when the recorded count reaches the expected
/// total.
#[derive(Debug)]
pub struct CompletionTracker {
    total: u64,
    completed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    sequence_conflicts: AtomicU64,
    endpoints: DashMap<String, EndpointCounters>,
    done: CancellationToken,
}

impl CompletionTracker {
    /// Track `total` expected tasks. A total of zero is complete immediately.
    pub fn new(total: u64) -> Self {
        let done = CancellationToken::new();
        if total == 0 {
            done.cancel();
        }
        Self {
            total,
            completed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            sequence_conflicts: AtomicU64::new(0),
            endpoints: DashMap::new(),
            done,
        }
    }

    /// Record one finished task. Returns `true` for the call that completed
    /// the run.
    pub fn record(&self, result: &WorkerResult) -> bool {
        let counters = self.endpoints.entry(result.endpoint.clone()).or_default();
        counters.submitted.fetch_add(1, Ordering::Relaxed);

        match &result.outcome {
            Ok(submission) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    batch = %result.batch,
                    device = %result.device,
                    status = ?submission.status(),
                    latency_ms = result.latency.as_millis() as u64,
                    "Log transaction accepted"
                );
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                counters.failed.fetch_add(1, Ordering::Relaxed);
                if result.is_sequence_conflict() {
                    self.sequence_conflicts.fetch_add(1, Ordering::Relaxed);
                    error!(
                        batch = %result.batch,
                        device = %result.device,
                        endpoint = %result.endpoint,
                        error = %e,
                        "Sequence conflict on log transaction"
                    );
                } else {
                    warn!(
                        batch = %result.batch,
                        device = %result.device,
                        endpoint = %result.endpoint,
                        error = %e,
                        "Log transaction failed"
                    );
                }
            }
        }
        drop(counters);

        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed == self.total {
            info!(total = self.total, "All dispatched tasks completed");
            self.done.cancel();
            return true;
        }
        if completed > self.total {
            warn!(completed, total = self.total, "More tasks recorded than dispatched");
        }
        false
    }

    /// Wait until every expected task has been recorded.
    pub async fn wait_complete(&self) {
        self.done.cancelled().await;
    }

    /// Whether every expected task has been recorded.
    pub fn is_complete(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Token cancelled on completion, for tying worker lifetimes to the run.
    pub fn completion_token(&self) -> CancellationToken {
        self.done.clone()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn sequence_conflicts(&self) -> u64 {
        self.sequence_conflicts.load(Ordering::Relaxed)
    }

    /// Snapshot of (endpoint, submitted, failed), sorted by endpoint.
    pub fn endpoint_counts(&self) -> Vec<(String, u64, u64)> {
        let mut counts: Vec<_> = self
            .endpoints
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.submitted.load(Ordering::Relaxed),
                    entry.failed.load(Ordering::Relaxed),
                )
            })
            .collect();
        counts.sort();
        counts
    }
}
