//! The durable log the pipeline reads from and writes to.
//!
//! Records, failure envelopes and dead letters all travel over the same
//! transport under different topic names. The pipeline only sees the
//! [`LogConsumer`] and [`LogProducer`] traits; [`kafka`] talks to a real
//! broker and [`memory`] keeps everything in process.

mod dead_letter;
mod guarded;
pub mod kafka;
pub mod memory;

pub use dead_letter::{DeadLetter, DeadLetterPublisher};
pub use guarded::GuardedProducer;
pub use kafka::{KafkaLogConsumer, KafkaLogProducer};
pub use memory::{MemoryConsumer, MemoryLog};

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::IngestError;

/// Header carrying the retry count of a resubmitted record.
pub const RETRY_COUNT_HEADER: &str = "retry-count";

/// A message read from the log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    /// Value of the [`RETRY_COUNT_HEADER`], 0 when absent.
    pub retry_count: u32,
}

/// A message to append to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub retry_count: Option<u32>,
}

impl OutboundMessage {
    /// Serialize `value` as the JSON payload of a message.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            topic: topic.into(),
            key: key.into(),
            payload: serde_json::to_vec(value)?,
            retry_count: None,
        })
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }
}

/// Pull side of the log.
#[async_trait]
pub trait LogConsumer: Send + Sync {
    /// Wait for the next message.
    ///
    /// `Ok(None)` means the log has ended and no more messages will arrive.
    async fn receive(&self) -> Result<Option<LogMessage>, IngestError>;

    /// Mark a message as handled so it is not redelivered.
    async fn ack(&self, message: &LogMessage) -> Result<(), IngestError>;
}

/// Push side of the log.
#[async_trait]
pub trait LogProducer: Send + Sync {
    /// Append a message, returning once the broker has accepted it.
    async fn send(&self, message: OutboundMessage) -> Result<(), IngestError>;
}

/// Parse a retry-count header value. Missing or garbled values count as 0.
pub fn parse_retry_count(value: Option<&[u8]>) -> u32 {
    value
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .and_then(|text| text.trim().parse().ok())
        .unwrap_or(0)
}
