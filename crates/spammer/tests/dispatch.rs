//! End-to-end dispatch against the in-memory ledger.

mod common;

use common::{test_config, MockLedger, CORE_DOWN, CORE_ENDPOINT, PASSPHRASE};
use iotload_spammer::client::EndpointSet;
use iotload_spammer::dispatcher::{DeviceAccount, Dispatcher};
use iotload_spammer::identity::generate_identities_from_seed;
use iotload_spammer::pool::WorkerPool;
use iotload_spammer::sequence::SequenceLedger;
use iotload_spammer::task::WorkerContext;
use iotload_spammer::tracker::CompletionTracker;
use iotload_spammer::{RunLength, Spammer};
use iotload_types::{AccountId, Amount, DeviceId, Identity, Network, SequenceNumber, BASE_FEE};
use std::sync::Arc;
use std::time::Duration;

fn devices(count: usize, seed: u64) -> Vec<DeviceAccount> {
    generate_identities_from_seed(count, seed)
        .into_iter()
        .enumerate()
        .map(|(i, identity)| DeviceAccount {
            device: DeviceId(i as u32),
            identity,
        })
        .collect()
}

fn context() -> Arc<WorkerContext> {
    Arc::new(WorkerContext {
        network: Network::new(PASSPHRASE),
        base_fee: BASE_FEE,
        payment_amount: Amount::ONE_STROOP,
    })
}

/// Register device accounts directly on the ledger and seed a matching
/// sequence ledger.
fn fund_directly(mock: &MockLedger, devices: &[DeviceAccount], start: i64) -> SequenceLedger {
    for device in devices {
        mock.insert_account(device.identity.account_id(), start);
    }
    SequenceLedger::seed(
        devices
            .iter()
            .map(|d| (d.identity.account_id(), SequenceNumber(start))),
    )
    .unwrap()
}

#[tokio::test]
async fn test_three_devices_two_batches() {
    let mock = Arc::new(MockLedger::genesis());
    let collection = Identity::generate();
    let config = test_config(&collection, 3)
        .with_run_length(RunLength::Batches(2))
        .with_seed(11);

    let mut spammer = Spammer::with_client(config, Arc::clone(&mock)).unwrap();
    let report = spammer.run().await.unwrap();

    assert_eq!(report.accounts_created, 3);
    assert_eq!(report.accounts_existing, 0);
    assert_eq!(report.batches, 2);
    assert_eq!(report.dispatched, 6);
    assert_eq!(report.completed, 6);
    assert_eq!(report.succeeded, 6);
    assert_eq!(report.sequence_conflicts, 0);
    report.check().unwrap();

    // Collection account plus three devices.
    assert_eq!(mock.accounts_created(), 4);
    assert!(mock.account_exists(&collection.account_id()));

    for identity in generate_identities_from_seed(3, 11) {
        let account = identity.account_id();
        let received = mock.received(&account);
        assert_eq!(received.len(), 2);
        let start = received[0] - 1;
        assert_eq!(received, vec![start + 1, start + 2]);
        assert_eq!(mock.sequence(&account), Some(start + 2));
    }
}

#[tokio::test]
async fn test_target_rate_sets_batch_count() {
    let mock = Arc::new(MockLedger::genesis());
    let collection = Identity::generate();
    // 6 tx/s for 2s over 4 devices -> 3 batches.
    let config = test_config(&collection, 4).with_run_length(RunLength::TargetRate {
        total_rate: 6.0,
        duration: Duration::from_secs(2),
    });

    let mut spammer = Spammer::with_client(config, Arc::clone(&mock)).unwrap();
    let report = spammer.run().await.unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.dispatched, 12);
    assert_eq!(report.completed, 12);
    assert_eq!(mock.core_submissions(), 12);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_only_its_tasks() {
    let mock = Arc::new(MockLedger::genesis().with_unreachable(CORE_DOWN));
    let collection = Identity::generate();
    let mut config = test_config(&collection, 20)
        .with_run_length(RunLength::Batches(1))
        .with_seed(3);
    config.submit_endpoints = vec![CORE_ENDPOINT.to_string(), CORE_DOWN.to_string()];

    let mut spammer = Spammer::with_client(config, Arc::clone(&mock)).unwrap();
    let report = spammer.run().await.unwrap();

    assert_eq!(report.completed, 20);
    assert_eq!(report.sequence_conflicts, 0);

    let healthy = report
        .endpoints
        .iter()
        .find(|e| e.endpoint == CORE_ENDPOINT)
        .unwrap();
    let down = report
        .endpoints
        .iter()
        .find(|e| e.endpoint == CORE_DOWN)
        .unwrap();

    assert_eq!(healthy.failed, 0);
    assert!(down.submitted > 0);
    assert_eq!(down.failed, down.submitted);
    assert_eq!(report.succeeded, healthy.submitted);
    assert_eq!(report.failed, down.submitted);
    assert_eq!(mock.core_submissions() as u64, healthy.submitted);
}

#[tokio::test]
async fn test_single_device_stays_in_order_under_submission_jitter() {
    let mock = Arc::new(MockLedger::genesis().with_jitter(&[
        Duration::from_millis(20),
        Duration::from_millis(1),
    ]));
    let collection = Identity::generate();
    let config = test_config(&collection, 1)
        .with_run_length(RunLength::Batches(6))
        .with_seed(4);

    let mut spammer = Spammer::with_client(config, Arc::clone(&mock)).unwrap();
    let report = spammer.run().await.unwrap();

    assert_eq!(report.completed, 6);
    assert_eq!(report.succeeded, 6);
    assert_eq!(report.sequence_conflicts, 0);
    report.check().unwrap();

    let device = generate_identities_from_seed(1, 4).remove(0);
    let received = mock.received(&device.account_id());
    let start = received[0] - 1;
    assert_eq!(received, (start + 1..=start + 6).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_every_device_stays_gap_free_under_submission_jitter() {
    let mock = Arc::new(MockLedger::genesis().with_jitter(&[
        Duration::from_millis(7),
        Duration::from_millis(1),
        Duration::from_millis(3),
    ]));
    let collection = Identity::generate();
    let config = test_config(&collection, 3)
        .with_run_length(RunLength::Batches(4))
        .with_pool_size(8)
        .with_seed(19);

    let mut spammer = Spammer::with_client(config, Arc::clone(&mock)).unwrap();
    let report = spammer.run().await.unwrap();

    assert_eq!(report.succeeded, 12);
    assert_eq!(report.sequence_conflicts, 0);
    for identity in generate_identities_from_seed(3, 19) {
        let received = mock.received(&identity.account_id());
        let start = received[0] - 1;
        assert_eq!(received, (start + 1..=start + 4).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_pool_reports_every_task_and_stops() {
    let mock = Arc::new(MockLedger::genesis());
    let devices = devices(5, 21);
    let ledger = fund_directly(&mock, &devices, 1000);

    let mut dispatcher = Dispatcher::new(
        3,
        EndpointSet::new(vec![CORE_ENDPOINT.to_string()]).unwrap(),
        AccountId([9; 32]),
    );
    let tracker = Arc::new(CompletionTracker::new(dispatcher.total_tasks(devices.len())));
    let (pool, intake, mut results) =
        WorkerPool::spawn(2, Arc::clone(&mock), context(), Arc::clone(&tracker));

    let summary = dispatcher.run(&ledger, &devices, &intake).await.unwrap();
    drop(intake);
    tracker.wait_complete().await;
    pool.shutdown().await;

    let mut delivered = 0;
    while let Some(result) = results.recv().await {
        assert!(result.is_success(), "{:?}", result.outcome);
        delivered += 1;
    }

    assert_eq!(summary.tasks, 15);
    assert_eq!(delivered, 15);
    assert_eq!(tracker.completed(), 15);
    for device in &devices {
        assert_eq!(
            mock.received(&device.identity.account_id()),
            vec![1001, 1002, 1003]
        );
    }
}

#[tokio::test]
async fn test_sequence_conflict_is_counted_not_retried() {
    let mock = Arc::new(MockLedger::genesis());
    let devices = devices(3, 5);
    let ledger = fund_directly(&mock, &devices, 0);
    // Another writer uses device 1's next sequence after the ledger is seeded.
    mock.bump_sequence(&devices[1].identity.account_id());

    let mut dispatcher = Dispatcher::new(
        1,
        EndpointSet::new(vec![CORE_ENDPOINT.to_string()]).unwrap(),
        AccountId([9; 32]),
    );
    let tracker = Arc::new(CompletionTracker::new(dispatcher.total_tasks(devices.len())));
    let (pool, intake, _results) =
        WorkerPool::spawn(4, Arc::clone(&mock), context(), Arc::clone(&tracker));

    dispatcher.run(&ledger, &devices, &intake).await.unwrap();
    drop(intake);
    tracker.wait_complete().await;
    pool.shutdown().await;

    assert_eq!(tracker.completed(), 3);
    assert_eq!(tracker.succeeded(), 2);
    assert_eq!(tracker.sequence_conflicts(), 1);
    assert_eq!(mock.core_submissions(), 3);
    assert!(mock.received(&devices[1].identity.account_id()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_rate_hands_off_back_to_back() {
    let mock = Arc::new(MockLedger::genesis());
    let devices = devices(4, 8);
    let ledger = fund_directly(&mock, &devices, 0);

    let mut dispatcher = Dispatcher::new(
        2,
        EndpointSet::new(vec![CORE_ENDPOINT.to_string()]).unwrap(),
        AccountId([9; 32]),
    )
    .with_task_rate(0.0);
    let tracker = Arc::new(CompletionTracker::new(dispatcher.total_tasks(devices.len())));
    let (pool, intake, _results) =
        WorkerPool::spawn(8, Arc::clone(&mock), context(), Arc::clone(&tracker));

    let started = tokio::time::Instant::now();
    dispatcher.run(&ledger, &devices, &intake).await.unwrap();
    assert_eq!(started.elapsed(), Duration::ZERO);

    drop(intake);
    tracker.wait_complete().await;
    pool.shutdown().await;
    assert_eq!(tracker.succeeded(), 8);
}

#[tokio::test]
async fn test_zero_batches_completes_immediately() {
    let mock = Arc::new(MockLedger::genesis());
    let collection = Identity::generate();
    let config = test_config(&collection, 2).with_run_length(RunLength::Batches(0));

    let mut spammer = Spammer::with_client(config, Arc::clone(&mock)).unwrap();
    let report = spammer.run().await.unwrap();

    assert_eq!(report.dispatched, 0);
    assert_eq!(report.completed, 0);
    assert_eq!(report.accounts_created, 2);
    assert_eq!(mock.core_submissions(), 0);
}
