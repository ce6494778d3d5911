use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use catalog_ingest_breaker::clock::elapsed_between;
use catalog_ingest_breaker::{Clock, SystemClock};
use catalog_ingest_shared::FailureEnvelope;

use crate::errors::IngestError;
use crate::queue::{
    DeadLetter, DeadLetterPublisher, GuardedProducer, LogConsumer, LogMessage, OutboundMessage,
};
use crate::retry::RetryPolicy;

/// Default time a pass waits for the next envelope before it ends.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default cap on envelopes read in one pass.
pub const DEFAULT_MAX_PER_PASS: usize = 1000;

/// Default interval between passes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// What [`RetryCoordinator::process`] did with an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The bare record went back to its original topic.
    Resubmitted,
    /// Not due yet; the envelope stays in the failure log.
    Deferred,
    /// Out of retries; dropped for good.
    Dropped,
}

/// Counters for one pass over the failure log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub read: usize,
    pub resubmitted: usize,
    pub deferred: usize,
    pub dropped: usize,
    pub invalid: usize,
    /// Messages left unacknowledged because they could not be settled.
    pub unsettled: usize,
}

/// A message read during a pass, and the envelope to put back if any.
struct Held {
    message: LogMessage,
    reappend: Option<FailureEnvelope>,
}

/// Replays failure envelopes once their backoff has elapsed.
///
/// The coordinator polls: each pass drains the failure log until it is idle
/// or `max_per_pass` messages were read. Due envelopes are resubmitted,
/// exhausted ones dropped, and the rest appended back to the failure log
/// unchanged at the end of the pass. A message is acknowledged only after
/// it has been settled, so a crash mid-pass redelivers instead of losing.
/// Resubmitting twice is harmless because the index upserts by id.
pub struct RetryCoordinator {
    consumer: Arc<dyn LogConsumer>,
    producer: GuardedProducer,
    dead_letters: DeadLetterPublisher,
    failure_topic: String,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    max_per_pass: usize,
    poll_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl RetryCoordinator {
    /// `consumer` must read `failure_topic`.
    pub fn new(
        consumer: Arc<dyn LogConsumer>,
        producer: GuardedProducer,
        dead_letters: DeadLetterPublisher,
        failure_topic: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            consumer,
            producer,
            dead_letters,
            failure_topic: failure_topic.into(),
            policy,
            clock: Arc::new(SystemClock),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_per_pass: DEFAULT_MAX_PER_PASS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_tx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_max_per_pass(mut self, max_per_pass: usize) -> Self {
        self.max_per_pass = max_per_pass.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Whether the envelope's jittered backoff has elapsed.
    pub fn should_retry_now(&self, envelope: &FailureEnvelope) -> bool {
        let backoff = self
            .policy
            .jittered_backoff(envelope.retry_count, &mut rand::thread_rng());
        elapsed_between(envelope.enqueued_at, self.clock.now()) >= backoff
    }

    /// Handle one envelope. Never mutates it.
    pub async fn process(&self, envelope: &FailureEnvelope) -> Result<RetryDecision, IngestError> {
        if envelope.is_exhausted(self.policy.max_retries) {
            error!(
                record_id = %envelope.record_id(),
                retry_count = envelope.retry_count,
                last_error = %envelope.last_error,
                "Record exhausted its retries, dropping"
            );
            self.dead_letters
                .publish(DeadLetter::exhausted(
                    envelope.record.clone(),
                    envelope.retry_count,
                    envelope.last_error.clone(),
                    envelope.original_destination.clone(),
                ))
                .await;
            return Ok(RetryDecision::Dropped);
        }

        if !self.should_retry_now(envelope) {
            debug!(
                record_id = %envelope.record_id(),
                retry_count = envelope.retry_count,
                "Envelope not due yet"
            );
            return Ok(RetryDecision::Deferred);
        }

        let message = OutboundMessage::json(
            &envelope.original_destination,
            envelope.record_id(),
            &envelope.record,
        )?
        .with_retry_count(envelope.retry_count);
        self.producer.send(message).await?;

        info!(
            record_id = %envelope.record_id(),
            retry_count = envelope.retry_count,
            destination = %envelope.original_destination,
            "Resubmitted record"
        );
        Ok(RetryDecision::Resubmitted)
    }

    /// Run one pass over the failure log.
    #[instrument(skip(self), fields(failure_topic = %self.failure_topic))]
    pub async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::default();
        let mut held = Vec::new();

        while report.read < self.max_per_pass {
            let message = match timeout(self.idle_timeout, self.consumer.receive()).await {
                Ok(Ok(Some(message))) => message,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    error!(error = %e, "Failed to read from failure log, ending pass");
                    break;
                }
                Err(_) => {
                    debug!("Failure log idle, ending pass");
                    break;
                }
            };
            report.read += 1;

            let envelope: FailureEnvelope = match serde_json::from_slice(&message.payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(offset = message.offset, error = %e, "Dropping unreadable envelope");
                    self.dead_letters
                        .publish(DeadLetter::invalid(&message, e.to_string()))
                        .await;
                    report.invalid += 1;
                    held.push(Held {
                        message,
                        reappend: None,
                    });
                    continue;
                }
            };

            let reappend = match self.process(&envelope).await {
                Ok(RetryDecision::Resubmitted) => {
                    report.resubmitted += 1;
                    None
                }
                Ok(RetryDecision::Dropped) => {
                    report.dropped += 1;
                    None
                }
                Ok(RetryDecision::Deferred) => {
                    report.deferred += 1;
                    Some(envelope)
                }
                Err(e) => {
                    warn!(
                        record_id = %envelope.record_id(),
                        error = %e,
                        "Failed to resubmit record, keeping envelope"
                    );
                    report.deferred += 1;
                    Some(envelope)
                }
            };
            held.push(Held { message, reappend });
        }

        report.unsettled = self.settle(held).await;
        report
    }

    /// Put deferred envelopes back, then acknowledge in read order up to the
    /// first message that could not be settled. Returns the number left
    /// unacknowledged.
    async fn settle(&self, held: Vec<Held>) -> usize {
        let total = held.len();
        for (settled, item) in held.into_iter().enumerate() {
            if let Some(envelope) = &item.reappend {
                let reappended = match OutboundMessage::json(
                    &self.failure_topic,
                    envelope.record_id(),
                    envelope,
                ) {
                    Ok(message) => self.producer.send(message).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = reappended {
                    warn!(
                        record_id = %envelope.record_id(),
                        error = %e,
                        "Failed to put envelope back, leaving the rest of the pass unacknowledged"
                    );
                    return total - settled;
                }
            }

            if let Err(e) = self.consumer.ack(&item.message).await {
                warn!(
                    offset = item.message.offset,
                    error = %e,
                    "Failed to acknowledge envelope"
                );
                return total - settled;
            }
        }
        0
    }

    /// Run passes every poll interval until shutdown or Ctrl-C.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            max_per_pass = self.max_per_pass,
            "Starting retry coordinator"
        );

        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_pass().await;
                    info!(
                        read = report.read,
                        resubmitted = report.resubmitted,
                        deferred = report.deferred,
                        dropped = report.dropped,
                        invalid = report.invalid,
                        unsettled = report.unsettled,
                        "Retry pass complete"
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        info!("Retry coordinator stopped");
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
