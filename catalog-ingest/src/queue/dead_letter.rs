use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use catalog_ingest_shared::ProductRecord;

use crate::queue::{GuardedProducer, LogMessage, OutboundMessage};

/// A record the pipeline gave up on, as written to the dead-letter topic.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub record_id: Option<String>,
    pub reason: String,
    pub retry_count: u32,
    pub source_topic: String,
    /// The record, when it could be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ProductRecord>,
    /// The raw payload, when it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    pub dropped_at: DateTime<Utc>,
}

impl DeadLetter {
    /// A record that ran out of retries.
    pub fn exhausted(
        record: ProductRecord,
        retry_count: u32,
        reason: impl Into<String>,
        source_topic: impl Into<String>,
    ) -> Self {
        Self {
            record_id: Some(record.id.clone()),
            reason: reason.into(),
            retry_count,
            source_topic: source_topic.into(),
            record: Some(record),
            raw_payload: None,
            dropped_at: Utc::now(),
        }
    }

    /// A message whose payload is not a usable record.
    pub fn invalid(message: &LogMessage, reason: impl Into<String>) -> Self {
        Self {
            record_id: message.key.clone(),
            reason: reason.into(),
            retry_count: message.retry_count,
            source_topic: message.topic.clone(),
            record: None,
            raw_payload: Some(String::from_utf8_lossy(&message.payload).into_owned()),
            dropped_at: Utc::now(),
        }
    }
}

/// Best-effort publisher for dropped records.
///
/// Dropping is always logged by the caller; publishing here is an extra copy
/// for later inspection, so failures are logged and swallowed.
#[derive(Clone)]
pub struct DeadLetterPublisher {
    producer: GuardedProducer,
    topic: Option<String>,
}

impl DeadLetterPublisher {
    /// `topic = None` disables publishing.
    pub fn new(producer: GuardedProducer, topic: Option<String>) -> Self {
        Self { producer, topic }
    }

    pub async fn publish(&self, letter: DeadLetter) {
        let Some(topic) = &self.topic else {
            debug!(record_id = ?letter.record_id, "No dead-letter topic configured");
            return;
        };

        let key = letter.record_id.clone().unwrap_or_default();
        let message = match OutboundMessage::json(topic, key, &letter) {
            Ok(message) => message,
            Err(e) => {
                warn!(record_id = ?letter.record_id, error = %e, "Failed to encode dead letter");
                return;
            }
        };

        if let Err(e) = self.producer.send(message).await {
            warn!(
                record_id = ?letter.record_id,
                topic = %topic,
                error = %e,
                "Failed to publish dead letter"
            );
        }
    }
}
