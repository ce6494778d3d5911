use tracing::{error, warn};

use catalog_ingest_shared::{FailureEnvelope, RecordDefect};

use crate::errors::IngestError;
use crate::queue::{DeadLetter, DeadLetterPublisher, GuardedProducer, LogMessage, OutboundMessage};

/// What happened to a failed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Written to the failure log for a later retry.
    Requeued,
    /// Out of retries; dropped for good.
    Dropped,
}

/// Sends failed records to the failure log, or drops them when they have
/// used up their retries.
pub struct FailureRouter {
    producer: GuardedProducer,
    dead_letters: DeadLetterPublisher,
    failure_topic: String,
    max_retries: u32,
}

impl FailureRouter {
    pub fn new(
        producer: GuardedProducer,
        dead_letters: DeadLetterPublisher,
        failure_topic: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            producer,
            dead_letters,
            failure_topic: failure_topic.into(),
            max_retries,
        }
    }

    /// Route a failed record.
    ///
    /// Returns an error only when the failure log could not be written, in
    /// which case the caller must not acknowledge the source message.
    pub async fn route(&self, envelope: FailureEnvelope) -> Result<RouteOutcome, IngestError> {
        if envelope.is_exhausted(self.max_retries) {
            error!(
                record_id = %envelope.record_id(),
                retry_count = envelope.retry_count,
                max_retries = self.max_retries,
                last_error = %envelope.last_error,
                "Record exhausted its retries, dropping"
            );
            self.dead_letters
                .publish(DeadLetter::exhausted(
                    envelope.record,
                    envelope.retry_count,
                    envelope.last_error,
                    envelope.original_destination,
                ))
                .await;
            return Ok(RouteOutcome::Dropped);
        }

        let message = OutboundMessage::json(&self.failure_topic, envelope.record_id(), &envelope)?;
        self.producer.send(message).await?;

        warn!(
            record_id = %envelope.record_id(),
            retry_count = envelope.retry_count,
            last_error = %envelope.last_error,
            failure_topic = %self.failure_topic,
            "Record sent to failure log"
        );
        Ok(RouteOutcome::Requeued)
    }

    /// Drop a message that is not a usable record. Such records are never retried.
    pub async fn drop_invalid(&self, message: &LogMessage, defect: &RecordDefect) {
        warn!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            key = ?message.key,
            error = %defect,
            "Dropping invalid record"
        );
        self.dead_letters
            .publish(DeadLetter::invalid(message, defect.to_string()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryLog;
    use catalog_ingest_breaker::{config, CircuitBreakerRegistry};
    use catalog_ingest_shared::ProductRecord;
    use serde_json::Value;

    fn router(log: &std::sync::Arc<MemoryLog>, registry: &CircuitBreakerRegistry) -> FailureRouter {
        let producer = GuardedProducer::new(log.clone(), registry.get_breaker(config::BROKER));
        FailureRouter::new(
            producer.clone(),
            DeadLetterPublisher::new(producer, Some("dead-letter-queue".to_string())),
            "products-retry",
            3,
        )
    }

    #[tokio::test]
    async fn test_requeues_until_exhausted() {
        let log = MemoryLog::new();
        let registry = CircuitBreakerRegistry::in_memory();
        let router = router(&log, &registry);
        let record = ProductRecord::new("P1", "Test");

        let outcome = router
            .route(FailureEnvelope::new(record.clone(), 2, "timeout", "products"))
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Requeued);

        let requeued = log.published("products-retry");
        assert_eq!(requeued.len(), 1);
        let envelope: FailureEnvelope = serde_json::from_slice(&requeued[0].payload).unwrap();
        assert_eq!(envelope.retry_count, 3);

        let outcome = router
            .route(FailureEnvelope::new(record, 3, "timeout", "products"))
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Dropped);
        assert_eq!(log.published("products-retry").len(), 1);

        let dead = log.published("dead-letter-queue");
        assert_eq!(dead.len(), 1);
        let letter: Value = serde_json::from_slice(&dead[0].payload).unwrap();
        assert_eq!(letter["record_id"], "P1");
        assert_eq!(letter["retry_count"], 4);
    }

    #[tokio::test]
    async fn test_invalid_record_goes_to_dead_letters() {
        let log = MemoryLog::new();
        let registry = CircuitBreakerRegistry::in_memory();
        let router = router(&log, &registry);
        log.publish("products", "bad", b"not json".to_vec(), 0);
        let message = log.published("products").remove(0);

        router
            .drop_invalid(&message, &RecordDefect::Malformed("expected value".to_string()))
            .await;

        let dead = log.published("dead-letter-queue");
        assert_eq!(dead.len(), 1);
        let letter: Value = serde_json::from_slice(&dead[0].payload).unwrap();
        assert_eq!(letter["raw_payload"], "not json");
        assert!(log.published("products-retry").is_empty());
    }
}
