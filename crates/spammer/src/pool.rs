//! Fixed-size worker pool.
//!
//! Each worker owns one bounded lane of the [`Intake`]. Tasks are routed to a
//! lane by device index, so every task for a given account is submitted by
//! the same worker, one at a time, in dispatch order. Workers execute their
//! tasks, record each outcome with the [`CompletionTracker`] and forward the
//! [`WorkerResult`] on the results channel. A lane holds at most one queued
//! task, so a saturated worker blocks the dispatcher's hand-off.

use crate::client::LedgerClient;
use crate::task::{execute_task, DispatchTask, WorkerContext, WorkerResult};
use crate::tracker::CompletionTracker;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Queued tasks allowed per lane.
const LANE_CAPACITY: usize = 1;

/// Sending half of the worker lanes.
///
/// Dropping it closes every lane; workers drain what is queued and exit.
#[derive(Clone, Debug)]
pub struct Intake {
    lanes: Vec<mpsc::Sender<DispatchTask>>,
}

impl Intake {
    /// Create `lanes` bounded lanes and their receivers, in lane order.
    pub fn channel(lanes: usize, capacity: usize) -> (Self, Vec<mpsc::Receiver<DispatchTask>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..lanes.max(1))
            .map(|_| mpsc::channel(capacity.max(1)))
            .unzip();
        (Self { lanes: senders }, receivers)
    }

    /// Lane serving `task`'s device.
    pub fn lane_for(&self, task: &DispatchTask) -> usize {
        task.device.0 as usize % self.lanes.len()
    }

    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Queue `task` on its device's lane, waiting for room.
    ///
    /// Returns the task back if that lane's worker has gone away.
    pub async fn send(&self, task: DispatchTask) -> Result<(), DispatchTask> {
        let lane = self.lane_for(&task);
        self.lanes[lane].send(task).await.map_err(|e| e.0)
    }
}

/// Handle to a running pool of workers.
pub struct WorkerPool {
    size: usize,
    workers: TaskTracker,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `size` workers, one per intake lane.
    ///
    /// Returns the pool, the task intake and the result stream. A worker stops
    /// when its lane is closed and drained, when the tracker reports the run
    /// complete, or on [`WorkerPool::shutdown`].
    pub fn spawn<C: LedgerClient>(
        size: usize,
        client: Arc<C>,
        context: Arc<WorkerContext>,
        tracker: Arc<CompletionTracker>,
    ) -> (
        Self,
        Intake,
        mpsc::UnboundedReceiver<WorkerResult>,
    ) {
        let size = size.max(1);
        let (intake, lanes) = Intake::channel(size, LANE_CAPACITY);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let shutdown = tracker.completion_token().child_token();
        let workers = TaskTracker::new();

        for (worker, lane) in lanes.into_iter().enumerate() {
            workers.spawn(run_worker(
                worker,
                lane,
                Arc::clone(&client),
                Arc::clone(&context),
                Arc::clone(&tracker),
                results_tx.clone(),
                shutdown.clone(),
            ));
        }
        workers.close();

        info!(size, "Worker pool started");
        (
            Self {
                size,
                workers,
                shutdown,
            },
            intake,
            results_rx,
        )
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Stop idle workers and wait for all of them to exit.
    ///
    /// A worker in the middle of a task finishes and reports it first.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.workers.wait().await;
        info!(size = self.size, "Worker pool stopped");
    }
}

async fn run_worker<C: LedgerClient>(
    worker: usize,
    mut lane: mpsc::Receiver<DispatchTask>,
    client: Arc<C>,
    context: Arc<WorkerContext>,
    tracker: Arc<CompletionTracker>,
    results: mpsc::UnboundedSender<WorkerResult>,
    shutdown: CancellationToken,
) {
    let mut executed = 0u64;
    loop {
        let task = tokio::select! {
            biased;
            task = lane.recv() => task,
            _ = shutdown.cancelled() => break,
        };
        let Some(task) = task else {
            break;
        };

        let result = execute_task(&task, client.as_ref(), &context).await;
        executed += 1;
        tracker.record(&result);
        // Receiver gone means nobody is aggregating; the tracker already has it.
        let _ = results.send(result);
    }
    debug!(worker, executed, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotload_types::{AccountId, BatchIndex, DeviceId, Identity, SequenceNumber};

    fn task(device: u32, sequence: i64) -> DispatchTask {
        let identity = Identity::generate();
        DispatchTask {
            batch: BatchIndex(0),
            device: DeviceId(device),
            account: identity.account_id(),
            account_sequence: SequenceNumber(sequence),
            destination: AccountId([1; 32]),
            endpoint: "http://core-1".to_string(),
            secret: identity.secret(),
        }
    }

    #[tokio::test]
    async fn test_device_always_lands_on_the_same_lane() {
        let (intake, mut lanes) = Intake::channel(3, 8);
        assert_eq!(intake.lanes(), 3);

        for sequence in 0..4 {
            intake.send(task(4, sequence)).await.unwrap();
            intake.send(task(2, sequence)).await.unwrap();
        }
        drop(intake);

        let mut lane_one = Vec::new();
        while let Some(task) = lanes[1].recv().await {
            assert_eq!(task.device, DeviceId(4));
            lane_one.push(task.account_sequence.get());
        }
        assert_eq!(lane_one, vec![0, 1, 2, 3]);

        let mut lane_two = 0;
        while let Some(task) = lanes[2].recv().await {
            assert_eq!(task.device, DeviceId(2));
            lane_two += 1;
        }
        assert_eq!(lane_two, 4);
        assert!(lanes[0].recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_lane_returns_the_task() {
        let (intake, lanes) = Intake::channel(2, 1);
        drop(lanes);
        let rejected = intake.send(task(1, 7)).await.unwrap_err();
        assert_eq!(rejected.account_sequence, SequenceNumber(7));
    }
}
