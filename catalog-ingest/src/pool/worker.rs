use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use catalog_ingest_shared::{EmbeddingSource, FailureEnvelope, ProductRecord};

use crate::pool::PipelineMetrics;
use crate::processor::{FailureRouter, RecordProcessor, RouteOutcome};
use crate::queue::{LogConsumer, LogMessage};

/// Pause after a failed receive before trying again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// First pause after a failed failure-log write; doubles up to the cap.
const ROUTE_RETRY_BASE: Duration = Duration::from_millis(100);
const ROUTE_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Everything a worker needs; shared by all workers of a pool.
pub(crate) struct Worker {
    pub(crate) consumer: Arc<dyn LogConsumer>,
    pub(crate) processor: Arc<RecordProcessor>,
    pub(crate) router: Arc<FailureRouter>,
    pub(crate) metrics: PipelineMetrics,
}

impl Worker {
    pub(crate) async fn run(&self, id: usize, mut shutdown: broadcast::Receiver<()>) {
        debug!(worker_id = id, "Worker started");

        loop {
            let received = tokio::select! {
                _ = shutdown.recv() => {
                    debug!(worker_id = id, "Worker received shutdown signal");
                    break;
                }
                received = self.consumer.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    if !self.handle(message, &mut shutdown).await {
                        debug!(worker_id = id, "Worker interrupted while routing a record");
                        break;
                    }
                }
                Ok(None) => {
                    info!(worker_id = id, "Input log ended");
                    break;
                }
                Err(e) => {
                    error!(worker_id = id, error = %e, "Failed to receive record");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }

        debug!(worker_id = id, "Worker stopped");
    }

    /// Settle one message. Every outcome is counted and logged.
    ///
    /// The worker stays on a failed record until its envelope is written.
    /// Returns `false` only when shutdown arrives first, leaving the message
    /// unacknowledged so it is redelivered.
    async fn handle(&self, message: LogMessage, shutdown: &mut broadcast::Receiver<()>) -> bool {
        self.metrics.record_received();

        let record = match ProductRecord::from_json(&message.payload) {
            Ok(record) => record,
            Err(defect) => {
                self.metrics.record_dropped_invalid();
                self.router.drop_invalid(&message, &defect).await;
                self.ack(&message).await;
                return true;
            }
        };

        match self.processor.process(record, message.retry_count).await {
            Ok(indexed) => {
                self.metrics.record_indexed(
                    indexed.text_source == EmbeddingSource::Fallback,
                    indexed.image_source == EmbeddingSource::Fallback,
                );
                self.ack(&message).await;
            }
            Err(envelope) => {
                let routed = tokio::select! {
                    _ = shutdown.recv() => None,
                    outcome = self.route_until_written(&envelope, &message) => Some(outcome),
                };
                match routed {
                    Some(RouteOutcome::Requeued) => {
                        self.metrics.record_requeued();
                        self.ack(&message).await;
                    }
                    Some(RouteOutcome::Dropped) => {
                        self.metrics.record_dropped_exhausted();
                        self.ack(&message).await;
                    }
                    None => {
                        self.metrics.record_unrouted();
                        error!(
                            record_id = %envelope.record_id(),
                            offset = message.offset,
                            "Shutting down before the record reached the failure log, leaving it unacknowledged"
                        );
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Route a failed record, retrying with capped exponential backoff for
    /// as long as the failure log cannot be written.
    async fn route_until_written(
        &self,
        envelope: &FailureEnvelope,
        message: &LogMessage,
    ) -> RouteOutcome {
        let mut delay = ROUTE_RETRY_BASE;
        loop {
            match self.router.route(envelope.clone()).await {
                Ok(outcome) => return outcome,
                Err(e) => warn!(
                    record_id = %envelope.record_id(),
                    offset = message.offset,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Failed to write record to failure log, retrying"
                ),
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(ROUTE_RETRY_MAX_DELAY);
        }
    }

    async fn ack(&self, message: &LogMessage) {
        if let Err(e) = self.consumer.ack(message).await {
            warn!(
                topic = %message.topic,
                offset = message.offset,
                error = %e,
                "Failed to acknowledge record"
            );
        }
    }
}
