//! Integration tests for the retry coordinator.
//!
//! The coordinator runs over an in-memory log with a manual clock, so
//! backoff can be exercised without sleeping.

mod common;

use std::sync::Arc;
use std::time::Duration;

use catalog_ingest::queue::{DeadLetterPublisher, GuardedProducer, LogProducer, MemoryLog};
use catalog_ingest::retry::{RetryCoordinator, RetryPolicy};
use catalog_ingest_breaker::config::BROKER;
use catalog_ingest_breaker::{CircuitBreakerRegistry, Clock, ManualClock};
use catalog_ingest_shared::{FailureEnvelope, ProductRecord};

use common::{
    record, worker_pool, MockIndex, ScriptedProvider, UnreachableProducer, DEAD_LETTER_TOPIC,
    FAILURE_TOPIC, INPUT_TOPIC,
};

struct Harness {
    log: Arc<MemoryLog>,
    clock: Arc<ManualClock>,
    registry: Arc<CircuitBreakerRegistry>,
}

impl Harness {
    fn new() -> Self {
        Self {
            log: MemoryLog::new(),
            clock: Arc::new(ManualClock::default()),
            registry: Arc::new(CircuitBreakerRegistry::in_memory()),
        }
    }

    fn coordinator(&self) -> RetryCoordinator {
        self.coordinator_with(self.log.clone())
    }

    fn coordinator_with(&self, producer: Arc<dyn LogProducer>) -> RetryCoordinator {
        let guarded = GuardedProducer::new(producer, self.registry.get_breaker(BROKER));
        RetryCoordinator::new(
            Arc::new(self.log.consumer(FAILURE_TOPIC)),
            guarded.clone(),
            DeadLetterPublisher::new(guarded, Some(DEAD_LETTER_TOPIC.to_string())),
            FAILURE_TOPIC,
            RetryPolicy::default(),
        )
        .with_clock(self.clock.clone())
        .with_idle_timeout(Duration::from_millis(50))
    }

    /// An envelope as the failure router writes it, enqueued now.
    fn enqueue(&self, id: &str, retry_count: u32) -> FailureEnvelope {
        let envelope = FailureEnvelope::new(
            record(id),
            retry_count - 1,
            "Connection error: connection refused",
            INPUT_TOPIC,
        )
        .with_enqueued_at(self.clock.now());
        self.log.publish(
            FAILURE_TOPIC,
            id,
            serde_json::to_vec(&envelope).unwrap(),
            0,
        );
        envelope
    }
}

#[tokio::test]
async fn test_due_envelope_is_resubmitted_with_retry_count() {
    let harness = Harness::new();
    harness.enqueue("P1", 1);
    harness.clock.advance(Duration::from_secs(7));

    let report = harness.coordinator().run_pass().await;

    assert_eq!(report.read, 1);
    assert_eq!(report.resubmitted, 1);
    assert_eq!(report.unsettled, 0);

    let resubmitted = harness.log.published(INPUT_TOPIC);
    assert_eq!(resubmitted.len(), 1);
    assert_eq!(resubmitted[0].retry_count, 1);
    assert_eq!(resubmitted[0].key.as_deref(), Some("P1"));
    let record = ProductRecord::from_json(&resubmitted[0].payload).unwrap();
    assert_eq!(record.id, "P1");
    assert_eq!(harness.log.acked(FAILURE_TOPIC), vec![0]);
}

#[tokio::test]
async fn test_envelope_not_due_is_put_back_unchanged() {
    let harness = Harness::new();
    let original = harness.enqueue("P1", 1);
    let coordinator = harness.coordinator();

    let first = coordinator.run_pass().await;

    assert_eq!(first.deferred, 1);
    assert!(harness.log.published(INPUT_TOPIC).is_empty());
    let failure_log = harness.log.published(FAILURE_TOPIC);
    assert_eq!(failure_log.len(), 2);
    let reappended: FailureEnvelope = serde_json::from_slice(&failure_log[1].payload).unwrap();
    assert_eq!(reappended.envelope_id, original.envelope_id);
    assert_eq!(reappended.retry_count, 1);
    assert_eq!(reappended.enqueued_at, original.enqueued_at);
    assert_eq!(harness.log.acked(FAILURE_TOPIC), vec![0]);

    harness.clock.advance(Duration::from_secs(7));
    let second = coordinator.run_pass().await;

    assert_eq!(second.read, 1);
    assert_eq!(second.resubmitted, 1);
    assert_eq!(harness.log.published(INPUT_TOPIC).len(), 1);
    assert_eq!(harness.log.acked(FAILURE_TOPIC), vec![0, 1]);
}

#[tokio::test]
async fn test_backoff_grows_with_retry_count() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    let first_retry = harness.enqueue("P1", 1);
    let third_retry = harness.enqueue("P3", 3);

    // 5s ±20% and 20s ±20%
    harness.clock.advance(Duration::from_secs(13));
    assert!(coordinator.should_retry_now(&first_retry));
    assert!(!coordinator.should_retry_now(&third_retry));

    harness.clock.advance(Duration::from_secs(12));
    assert!(coordinator.should_retry_now(&third_retry));
}

#[tokio::test]
async fn test_exhausted_envelope_is_dropped() {
    let harness = Harness::new();
    harness.enqueue("P1", 4);
    harness.clock.advance(Duration::from_secs(600));

    let report = harness.coordinator().run_pass().await;

    assert_eq!(report.dropped, 1);
    assert!(harness.log.published(INPUT_TOPIC).is_empty());
    assert_eq!(harness.log.published(DEAD_LETTER_TOPIC).len(), 1);
    assert_eq!(harness.log.published(FAILURE_TOPIC).len(), 1);
    assert_eq!(harness.log.acked(FAILURE_TOPIC), vec![0]);
}

#[tokio::test]
async fn test_unreadable_envelope_is_dead_lettered() {
    let harness = Harness::new();
    harness
        .log
        .publish(FAILURE_TOPIC, "junk", b"not an envelope".to_vec(), 0);

    let report = harness.coordinator().run_pass().await;

    assert_eq!(report.invalid, 1);
    assert_eq!(harness.log.published(DEAD_LETTER_TOPIC).len(), 1);
    assert_eq!(harness.log.acked(FAILURE_TOPIC), vec![0]);
}

#[tokio::test]
async fn test_pass_stops_at_max_per_pass() {
    let harness = Harness::new();
    for i in 0..5 {
        harness.enqueue(&format!("P{}", i), 1);
    }
    harness.clock.advance(Duration::from_secs(7));

    let coordinator = harness.coordinator().with_max_per_pass(3);
    let first = coordinator.run_pass().await;
    let second = coordinator.run_pass().await;

    assert_eq!(first.resubmitted, 3);
    assert_eq!(second.resubmitted, 2);
    assert_eq!(harness.log.published(INPUT_TOPIC).len(), 5);
}

#[tokio::test]
async fn test_open_broker_breaker_keeps_envelope_unacknowledged() {
    let harness = Harness::new();
    harness.enqueue("P1", 1);
    harness.clock.advance(Duration::from_secs(7));
    let broker = harness.registry.get_breaker(BROKER);
    for _ in 0..5 {
        broker.record_failure().await;
    }

    let report = harness.coordinator().run_pass().await;

    assert_eq!(report.deferred, 1);
    assert_eq!(report.unsettled, 1);
    assert!(harness.log.published(INPUT_TOPIC).is_empty());
    assert_eq!(harness.log.published(FAILURE_TOPIC).len(), 1);
    assert!(harness.log.acked(FAILURE_TOPIC).is_empty());
}

#[tokio::test]
async fn test_broker_errors_are_reported_to_the_breaker() {
    let harness = Harness::new();
    harness.enqueue("P1", 1);
    harness.clock.advance(Duration::from_secs(7));
    let producer = Arc::new(UnreachableProducer::default());

    let report = harness.coordinator_with(producer.clone()).run_pass().await;

    assert_eq!(report.unsettled, 1);
    // Resubmit, then the attempt to put the envelope back
    assert_eq!(
        producer.attempts.load(std::sync::atomic::Ordering::SeqCst),
        2
    );
    assert_eq!(
        harness
            .registry
            .get_breaker(BROKER)
            .get_state()
            .await
            .failure_count,
        2
    );
}

#[tokio::test]
async fn test_failed_record_is_indexed_after_retry() {
    let harness = Harness::new();
    let index = Arc::new(MockIndex::failing());
    let provider = Arc::new(ScriptedProvider::healthy(384));
    harness
        .log
        .publish(INPUT_TOPIC, "P1", common::payload(&record("P1")), 0);

    let first = worker_pool(
        &harness.log,
        index.clone(),
        provider.clone(),
        harness.registry.clone(),
        harness.log.clone(),
    )
    .run()
    .await;
    assert_eq!(first.requeued, 1);

    index
        .failing
        .store(false, std::sync::atomic::Ordering::SeqCst);
    harness.clock.advance(Duration::from_secs(7));
    let pass = harness.coordinator().run_pass().await;
    assert_eq!(pass.resubmitted, 1);

    let second = worker_pool(
        &harness.log,
        index.clone(),
        provider,
        harness.registry.clone(),
        harness.log.clone(),
    )
    .run()
    .await;

    assert_eq!(second.indexed, 1);
    assert!(index.get("P1").is_some());
    assert_eq!(harness.log.published(INPUT_TOPIC)[1].retry_count, 1);
    assert_eq!(harness.log.acked(INPUT_TOPIC), vec![0, 1]);
}
