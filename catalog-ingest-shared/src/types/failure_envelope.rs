//! Failure envelopes written to the failure log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::product_record::ProductRecord;

/// Number of requeues a record gets before it is dropped for good.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A record that failed processing, plus its retry bookkeeping.
///
/// `retry_count` starts at 1 for the first failure and grows by one every time
/// the same logical record fails again after being resubmitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureEnvelope {
    pub envelope_id: Uuid,
    pub record: ProductRecord,
    pub retry_count: u32,
    pub last_error: String,
    pub enqueued_at: DateTime<Utc>,
    pub original_destination: String,
}

impl FailureEnvelope {
    /// Wrap a failed record.
    ///
    /// `previous_retry_count` is the count the record carried when it was
    /// received (0 for a record seen for the first time).
    pub fn new(
        record: ProductRecord,
        previous_retry_count: u32,
        last_error: impl Into<String>,
        original_destination: impl Into<String>,
    ) -> Self {
        Self {
            envelope_id: Uuid::new_v4(),
            record: record.without_embeddings(),
            retry_count: previous_retry_count.saturating_add(1),
            last_error: last_error.into(),
            enqueued_at: Utc::now(),
            original_destination: original_destination.into(),
        }
    }

    pub fn with_enqueued_at(mut self, enqueued_at: DateTime<Utc>) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    /// Whether this envelope has used up its retries.
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count > max_retries
    }

    pub fn record_id(&self) -> &str {
        &self.record.id
    }
}
