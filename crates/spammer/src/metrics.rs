//! Latency recording and the end-of-run report.

use crate::runner::SpammerError;
use crate::tracker::CompletionTracker;
use hdrhistogram::Histogram;
use std::time::Duration;

/// Records submission latencies in microseconds.
pub struct LatencyRecorder {
    histogram: Histogram<u64>,
}

impl LatencyRecorder {
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        Ok(Self {
            histogram: Histogram::new(3)?,
        })
    }

    pub fn record(&mut self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(micros.max(1));
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn summary(&self) -> LatencySummary {
        if self.histogram.is_empty() {
            return LatencySummary::default();
        }
        let at = |q: f64| Duration::from_micros(self.histogram.value_at_quantile(q));
        LatencySummary {
            p50: at(0.50),
            p90: at(0.90),
            p99: at(0.99),
            max: Duration::from_micros(self.histogram.max()),
        }
    }
}

/// Latency percentiles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
}

/// Submissions per endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointReport {
    pub endpoint: String,
    pub submitted: u64,
    pub failed: u64,
}

/// Summary of a spammer run.
#[derive(Clone, Debug)]
pub struct SpammerReport {
    pub devices: usize,
    pub batches: u64,
    /// Accounts created during provisioning.
    pub accounts_created: usize,
    /// Accounts that already existed.
    pub accounts_existing: usize,
    pub dispatched: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub sequence_conflicts: u64,
    pub endpoints: Vec<EndpointReport>,
    pub latency: LatencySummary,
    /// Time from first dispatch to last completion.
    pub elapsed: Duration,
}

impl SpammerReport {
    /// Assemble a report from the tracker's final counts.
    pub(crate) fn from_tracker(
        tracker: &CompletionTracker,
        dispatched: u64,
        batches: u64,
        latency: LatencySummary,
        elapsed: Duration,
    ) -> Self {
        Self {
            devices: 0,
            batches,
            accounts_created: 0,
            accounts_existing: 0,
            dispatched,
            completed: tracker.completed(),
            succeeded: tracker.succeeded(),
            failed: tracker.failed(),
            sequence_conflicts: tracker.sequence_conflicts(),
            endpoints: tracker
                .endpoint_counts()
                .into_iter()
                .map(|(endpoint, submitted, failed)| EndpointReport {
                    endpoint,
                    submitted,
                    failed,
                })
                .collect(),
            latency,
            elapsed,
        }
    }

    /// Accepted submissions per second over the dispatch window.
    pub fn achieved_tps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.succeeded as f64 / secs
        } else {
            0.0
        }
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!();
        println!("=== Spammer Report ===");
        println!("Devices:            {}", self.devices);
        println!(
            "Accounts:           {} created, {} already funded",
            self.accounts_created, self.accounts_existing
        );
        println!("Batches:            {}", self.batches);
        println!("Dispatched:         {}", self.dispatched);
        println!("Completed:          {}", self.completed);
        println!("Succeeded:          {}", self.succeeded);
        println!("Failed:             {}", self.failed);
        println!("Sequence conflicts: {}", self.sequence_conflicts);
        println!("Elapsed:            {:.2}s", self.elapsed.as_secs_f64());
        println!("Achieved TPS:       {:.1}", self.achieved_tps());
        println!(
            "Latency:            p50={:?} p90={:?} p99={:?} max={:?}",
            self.latency.p50, self.latency.p90, self.latency.p99, self.latency.max
        );
        if !self.endpoints.is_empty() {
            println!();
            println!("{:<40} {:>10} {:>10}", "Endpoint", "Submitted", "Failed");
            for endpoint in &self.endpoints {
                println!(
                    "{:<40} {:>10} {:>10}",
                    endpoint.endpoint, endpoint.submitted, endpoint.failed
                );
            }
        }
    }

    /// Fail if the run hit any sequence conflict.
    pub fn check(&self) -> Result<(), SpammerError> {
        if self.sequence_conflicts > 0 {
            return Err(SpammerError::SequenceConflicts(self.sequence_conflicts));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_percentiles() {
        let mut recorder = LatencyRecorder::new().unwrap();
        for ms in 1..=100 {
            recorder.record(Duration::from_millis(ms));
        }
        assert_eq!(recorder.count(), 100);

        let summary = recorder.summary();
        let close = |actual: Duration, expected_ms: u64| {
            let diff = actual.as_micros() as i64 - (expected_ms * 1000) as i64;
            diff.abs() < 1000
        };
        assert!(close(summary.p50, 50), "{:?}", summary);
        assert!(close(summary.p99, 99), "{:?}", summary);
        assert!(close(summary.max, 100), "{:?}", summary);
    }

    #[test]
    fn test_empty_recorder_summary() {
        let recorder = LatencyRecorder::new().unwrap();
        assert_eq!(recorder.summary(), LatencySummary::default());
    }

    #[test]
    fn test_check_flags_sequence_conflicts() {
        let tracker = CompletionTracker::new(0);
        let mut report = SpammerReport::from_tracker(
            &tracker,
            0,
            0,
            LatencySummary::default(),
            Duration::from_secs(1),
        );
        assert!(report.check().is_ok());

        report.sequence_conflicts = 2;
        assert!(matches!(
            report.check(),
            Err(SpammerError::SequenceConflicts(2))
        ));
    }
}
