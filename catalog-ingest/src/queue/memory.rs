//! In-process log.
//!
//! Every topic is an append-only vector with a single read cursor. A consumer
//! that reaches the end of its topic gets `None`, which the worker pool and
//! retry coordinator treat as end of stream. Used by tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::errors::IngestError;
use crate::queue::{LogConsumer, LogMessage, LogProducer, OutboundMessage};

#[derive(Debug, Default)]
struct TopicLog {
    messages: Vec<LogMessage>,
    cursor: usize,
    acked: Vec<i64>,
}

/// A multi-topic log held in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    topics: Mutex<HashMap<String, TopicLog>>,
}

impl MemoryLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A consumer reading `topic` from its current cursor.
    pub fn consumer(self: &Arc<Self>, topic: impl Into<String>) -> MemoryConsumer {
        MemoryConsumer {
            log: Arc::clone(self),
            topic: topic.into(),
        }
    }

    /// Append a raw payload, as an upstream producer would.
    pub fn publish(&self, topic: &str, key: &str, payload: Vec<u8>, retry_count: u32) {
        let mut topics = self.lock();
        let log = topics.entry(topic.to_string()).or_default();
        let offset = log.messages.len() as i64;
        log.messages.push(LogMessage {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: Some(key.to_string()),
            payload,
            retry_count,
        });
    }

    /// Every message ever appended to `topic`.
    pub fn published(&self, topic: &str) -> Vec<LogMessage> {
        self.lock()
            .get(topic)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Messages of `topic` not yet handed to a consumer.
    pub fn pending(&self, topic: &str) -> Vec<LogMessage> {
        self.lock()
            .get(topic)
            .map(|log| log.messages[log.cursor..].to_vec())
            .unwrap_or_default()
    }

    /// Offsets acknowledged on `topic`, in acknowledgement order.
    pub fn acked(&self, topic: &str) -> Vec<i64> {
        self.lock()
            .get(topic)
            .map(|log| log.acked.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TopicLog>> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LogProducer for MemoryLog {
    async fn send(&self, message: OutboundMessage) -> Result<(), IngestError> {
        self.publish(
            &message.topic,
            &message.key,
            message.payload,
            message.retry_count.unwrap_or(0),
        );
        Ok(())
    }
}

/// Read side of a [`MemoryLog`] topic.
pub struct MemoryConsumer {
    log: Arc<MemoryLog>,
    topic: String,
}

#[async_trait]
impl LogConsumer for MemoryConsumer {
    async fn receive(&self) -> Result<Option<LogMessage>, IngestError> {
        let mut topics = self.log.lock();
        let log = topics.entry(self.topic.clone()).or_default();
        let next = log.messages.get(log.cursor).cloned();
        if next.is_some() {
            log.cursor += 1;
        }
        Ok(next)
    }

    async fn ack(&self, message: &LogMessage) -> Result<(), IngestError> {
        self.log
            .lock()
            .entry(message.topic.clone())
            .or_default()
            .acked
            .push(message.offset);
        Ok(())
    }
}
