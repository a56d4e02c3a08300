use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use command_relay::{
    config::RelayConfig,
    models::command::{Command, CommandPayload, CommandStatus},
    models::result::{ResultStatus, TaskResult},
    services::{
        poller::WorkerPoller,
        producer::{AwaitError, CommandProducer, SubmitError},
        runner::{TaskError, TaskOutcome, TaskRunner},
        store::{self, MemoryQueueStore, QueueStore, Slot},
    },
};

fn test_config() -> RelayConfig {
    RelayConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        queue_bucket: "test-bucket".to_string(),
        queue_endpoint: "http://localhost:9000".to_string(),
        queue_access_key: "test".to_string(),
        queue_secret_key: "test".to_string(),
        queue_prefix: "relay-queue".to_string(),
        poll_interval_secs: 1,
        result_poll_interval_secs: 1,
        result_wait_timeout_secs: 60,
        staleness_threshold_secs: 600,
        claim_timeout_secs: 90,
        store_max_retries: 1,
        store_retry_base_ms: 10,
        default_task: "run_automation".to_string(),
        task_command: None,
    }
}

/// Task runner stub with a fixed outcome and a call counter.
struct StubRunner {
    success: bool,
    detail: String,
    calls: Arc<AtomicUsize>,
}

impl StubRunner {
    fn succeeding(detail: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                success: true,
                detail: detail.to_string(),
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn failing(detail: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                success: false,
                detail: detail.to_string(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl TaskRunner for StubRunner {
    async fn run_task(&self, _payload: &CommandPayload) -> Result<TaskOutcome, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TaskOutcome {
            success: self.success,
            detail: self.detail.clone(),
        })
    }
}

/// Task runner stub that cannot even be launched.
struct BrokenRunner;

#[async_trait]
impl TaskRunner for BrokenRunner {
    async fn run_task(&self, _payload: &CommandPayload) -> Result<TaskOutcome, TaskError> {
        Err(TaskError::Launch(std::io::Error::other("boom")))
    }
}

async fn slot_command(store: &MemoryQueueStore) -> Option<Command> {
    store
        .get(Slot::Command)
        .await
        .expect("store read failed")
        .map(|b| store::decode(&b).expect("undecodable command record"))
}

async fn slot_result(store: &MemoryQueueStore) -> Option<TaskResult> {
    store
        .get(Slot::Result)
        .await
        .expect("store read failed")
        .map(|b| store::decode(&b).expect("undecodable result record"))
}

async fn put_command(store: &MemoryQueueStore, command: &Command) {
    store
        .put(Slot::Command, &store::encode(command).unwrap())
        .await
        .unwrap();
}

async fn put_result(store: &MemoryQueueStore, result: &TaskResult) {
    store
        .put(Slot::Result, &store::encode(result).unwrap())
        .await
        .unwrap();
}

/// Full round trip: submit, worker claims and executes within one cycle,
/// producer collects the matching result and acknowledges it.
#[tokio::test(start_paused = true)]
async fn round_trip_success() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let producer = CommandProducer::new(store.clone(), &config);
    let (runner, calls) = StubRunner::succeeding("240 tickets uploaded");
    let poller = WorkerPoller::new(store.clone(), runner, &config);

    let handle = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .expect("submit failed");

    let pending = slot_command(&store).await.expect("command slot empty");
    assert_eq!(pending.id, handle.id);
    assert_eq!(pending.status, CommandStatus::Pending);

    assert!(poller.poll_once().await.expect("poll failed"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Command cleared, result waiting.
    assert!(slot_command(&store).await.is_none());
    assert!(slot_result(&store).await.is_some());

    let result = producer
        .await_result(&handle, Duration::from_secs(60))
        .await
        .expect("await_result failed");

    assert_eq!(result.command_id, handle.id);
    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.detail, "240 tickets uploaded");

    // Collecting the result acknowledges (deletes) it.
    assert!(slot_result(&store).await.is_none());
}

#[tokio::test]
async fn submit_is_busy_while_command_outstanding() {
    let store = Arc::new(MemoryQueueStore::new());
    let producer = CommandProducer::new(store.clone(), &test_config());

    producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .expect("first submit failed");

    let err = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .expect_err("second submit should be rejected");
    assert!(matches!(err, SubmitError::Busy { .. }));
}

#[tokio::test]
async fn submit_overwrites_stale_command() {
    let store = Arc::new(MemoryQueueStore::new());
    let producer = CommandProducer::new(store.clone(), &test_config());

    let abandoned = Command {
        issued_at: Utc::now() - ChronoDuration::seconds(700),
        ..Command::pending(CommandPayload::new("process_tickets"))
    };
    put_command(&store, &abandoned).await;

    let handle = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .expect("submit over a stale command should succeed");

    let current = slot_command(&store).await.expect("command slot empty");
    assert_eq!(current.id, handle.id);
    assert_ne!(current.id, abandoned.id);
}

/// A result from an unrelated cycle must never be mistaken for ours.
#[tokio::test(start_paused = true)]
async fn mismatched_result_is_ignored() {
    let store = Arc::new(MemoryQueueStore::new());
    let producer = CommandProducer::new(store.clone(), &test_config());

    let handle = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .unwrap();

    let unrelated = TaskResult::for_command(Uuid::new_v4(), ResultStatus::Success, "not yours");
    put_result(&store, &unrelated).await;

    let err = producer
        .await_result(&handle, Duration::from_secs(5))
        .await
        .expect_err("mismatched result must not satisfy the wait");
    assert!(matches!(err, AwaitError::Timeout(id) if id == handle.id));

    // The unrelated result is fresh, so it stays in place.
    let leftover = slot_result(&store).await.expect("result slot cleared");
    assert_eq!(leftover.command_id, unrelated.command_id);
}

#[tokio::test(start_paused = true)]
async fn stale_orphaned_result_is_discarded() {
    let store = Arc::new(MemoryQueueStore::new());
    let producer = CommandProducer::new(store.clone(), &test_config());

    let handle = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .unwrap();

    let orphan = TaskResult {
        completed_at: Utc::now() - ChronoDuration::seconds(700),
        ..TaskResult::for_command(Uuid::new_v4(), ResultStatus::Success, "ancient")
    };
    put_result(&store, &orphan).await;

    let err = producer
        .await_result(&handle, Duration::from_secs(3))
        .await
        .expect_err("no matching result exists");
    assert!(matches!(err, AwaitError::Timeout(_)));

    // The stale orphan was cleaned up along the way.
    assert!(slot_result(&store).await.is_none());
}

/// A runner that fails to launch still produces a FAILURE result and
/// clears the command; the producer must never hang on a silent claim.
#[tokio::test(start_paused = true)]
async fn launch_failure_still_produces_result() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let producer = CommandProducer::new(store.clone(), &config);
    let poller = WorkerPoller::new(store.clone(), BrokenRunner, &config);

    let handle = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .unwrap();

    assert!(poller.poll_once().await.expect("poll failed"));
    assert!(slot_command(&store).await.is_none());

    let result = producer
        .await_result(&handle, Duration::from_secs(60))
        .await
        .expect("failure result expected");
    assert_eq!(result.status, ResultStatus::Failure);
    assert!(result.detail.contains("boom"));
}

#[tokio::test(start_paused = true)]
async fn task_failure_outcome_becomes_failure_result() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let producer = CommandProducer::new(store.clone(), &config);
    let (runner, _) = StubRunner::failing("exit code 1: disk full");
    let poller = WorkerPoller::new(store.clone(), runner, &config);

    let handle = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .unwrap();
    assert!(poller.poll_once().await.unwrap());

    let result = producer
        .await_result(&handle, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(result.status, ResultStatus::Failure);
    assert_eq!(result.detail, "exit code 1: disk full");
}

/// With no worker running, the wait times out and the pending command is
/// left untouched for a later pickup.
#[tokio::test(start_paused = true)]
async fn timeout_leaves_command_in_place() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let producer = CommandProducer::new(store.clone(), &config);

    let handle = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .unwrap();

    let err = producer
        .await_result(&handle, Duration::from_secs(60))
        .await
        .expect_err("no worker is running");
    assert!(matches!(err, AwaitError::Timeout(id) if id == handle.id));

    let still_there = slot_command(&store).await.expect("command slot cleared");
    assert_eq!(still_there.id, handle.id);
    assert_eq!(still_there.status, CommandStatus::Pending);
}

/// A late result is still collectible by a following wait; the producer
/// does not assume the worker stopped.
#[tokio::test(start_paused = true)]
async fn late_result_collected_by_next_wait() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let producer = CommandProducer::new(store.clone(), &config);
    let (runner, _) = StubRunner::succeeding("finally done");
    let poller = WorkerPoller::new(store.clone(), runner, &config);

    let handle = producer
        .submit(CommandPayload::new("process_tickets"))
        .await
        .unwrap();

    let err = producer
        .await_result(&handle, Duration::from_secs(5))
        .await
        .expect_err("worker has not run yet");
    assert!(matches!(err, AwaitError::Timeout(_)));

    // The worker catches up after the first wait expired.
    assert!(poller.poll_once().await.unwrap());

    let result = producer
        .await_result(&handle, Duration::from_secs(60))
        .await
        .expect("late result should be collectible");
    assert_eq!(result.command_id, handle.id);
    assert_eq!(result.detail, "finally done");
}

/// A command claimed recently belongs to another poller instance.
#[tokio::test]
async fn recent_claim_is_skipped() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let (runner, calls) = StubRunner::succeeding("should not run");
    let poller = WorkerPoller::new(store.clone(), runner, &config);

    let claimed = Command::pending(CommandPayload::new("process_tickets")).claimed();
    put_command(&store, &claimed).await;

    assert!(!poller.poll_once().await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let untouched = slot_command(&store).await.expect("command slot cleared");
    assert_eq!(untouched.id, claimed.id);
    assert_eq!(untouched.status, CommandStatus::Claimed);
}

/// A claim whose owner died is demoted after the claim timeout and the
/// command runs again.
#[tokio::test(start_paused = true)]
async fn expired_claim_is_reclaimed() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let (runner, calls) = StubRunner::succeeding("second attempt worked");
    let poller = WorkerPoller::new(store.clone(), runner, &config);

    let mut abandoned = Command::pending(CommandPayload::new("process_tickets")).claimed();
    abandoned.claimed_at = Some(Utc::now() - ChronoDuration::seconds(120));
    put_command(&store, &abandoned).await;

    assert!(poller.poll_once().await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let result = slot_result(&store).await.expect("no result written");
    assert_eq!(result.command_id, abandoned.id);
    assert_eq!(result.status, ResultStatus::Success);
    assert!(slot_command(&store).await.is_none());
}

/// A pending command older than the staleness threshold was abandoned by
/// the producer; the worker reclaims the slot without running it.
#[tokio::test]
async fn stale_pending_command_is_dropped_without_execution() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let (runner, calls) = StubRunner::succeeding("should not run");
    let poller = WorkerPoller::new(store.clone(), runner, &config);

    let abandoned = Command {
        issued_at: Utc::now() - ChronoDuration::seconds(700),
        ..Command::pending(CommandPayload::new("process_tickets"))
    };
    put_command(&store, &abandoned).await;

    assert!(poller.poll_once().await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(slot_command(&store).await.is_none());
    assert!(slot_result(&store).await.is_none());
}

/// The poll loop stops at the next iteration boundary once shutdown is
/// requested, without waiting out the full interval.
#[tokio::test(start_paused = true)]
async fn poll_loop_stops_on_shutdown() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = test_config();
    let (runner, _) = StubRunner::succeeding("idle");
    let poller = Arc::new(WorkerPoller::new(store, runner, &config));

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let loop_handle = tokio::spawn({
        let poller = poller.clone();
        async move { poller.run(shutdown_rx).await }
    });

    shutdown_tx.send(()).expect("loop not listening");

    tokio::time::timeout(Duration::from_secs(10), loop_handle)
        .await
        .expect("poll loop did not stop after shutdown")
        .expect("poll loop panicked");
}
