//! Kafka-backed log.

use std::time::Duration;

use async_trait::async_trait;
use catalog_kafka::{
    create_consumer, create_producer, CommitMode, Consumer, FutureProducer, FutureRecord, Header,
    Headers, KafkaConfig, Message, Offset, OwnedHeaders, StreamConsumer, Timeout,
    TopicPartitionList,
};
use rdkafka::message::BorrowedMessage;
use tracing::{debug, info};

use crate::errors::IngestError;
use crate::queue::{
    parse_retry_count, LogConsumer, LogMessage, LogProducer, OutboundMessage, RETRY_COUNT_HEADER,
};

/// Default time to wait for the broker to accept a produced message.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer over one or more topics with manual offset commits.
///
/// One consumer is shared by every worker of a pool; `recv` hands each
/// message to exactly one caller.
pub struct KafkaLogConsumer {
    consumer: StreamConsumer,
}

impl KafkaLogConsumer {
    /// Create a consumer and subscribe it to `topics`.
    pub fn new(config: &KafkaConfig, topics: &[String]) -> Result<Self, IngestError> {
        let consumer = create_consumer(config).map_err(|e| IngestError::kafka(e.to_string()))?;

        let topic_refs: Vec<&str> = topics.iter().map(|s| s.as_str()).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| IngestError::kafka(e.to_string()))?;

        info!(
            broker = %config.broker,
            group_id = %config.group_id,
            topics = ?topics,
            "Subscribed to Kafka topics"
        );

        Ok(Self { consumer })
    }
}

fn to_log_message(msg: &BorrowedMessage<'_>) -> LogMessage {
    let retry_count = msg
        .headers()
        .and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == RETRY_COUNT_HEADER)
                .map(|header| parse_retry_count(header.value))
        })
        .unwrap_or(0);

    LogMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned()),
        payload: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
        retry_count,
    }
}

#[async_trait]
impl LogConsumer for KafkaLogConsumer {
    async fn receive(&self) -> Result<Option<LogMessage>, IngestError> {
        let msg = self.consumer.recv().await?;
        debug!(
            topic = %msg.topic(),
            partition = msg.partition(),
            offset = msg.offset(),
            "Received message from Kafka"
        );
        Ok(Some(to_log_message(&msg)))
    }

    async fn ack(&self, message: &LogMessage) -> Result<(), IngestError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| IngestError::kafka(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| IngestError::kafka(e.to_string()))?;
        Ok(())
    }
}

/// Producer appending JSON messages, optionally tagged with a retry count.
pub struct KafkaLogProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaLogProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, IngestError> {
        let producer = create_producer(config).map_err(|e| IngestError::kafka(e.to_string()))?;
        Ok(Self {
            producer,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        })
    }
}

#[async_trait]
impl LogProducer for KafkaLogProducer {
    async fn send(&self, message: OutboundMessage) -> Result<(), IngestError> {
        let retry_count = message.retry_count.map(|count| count.to_string());

        let mut record = FutureRecord::to(&message.topic)
            .key(message.key.as_str())
            .payload(message.payload.as_slice());
        if let Some(value) = &retry_count {
            record = record.headers(OwnedHeaders::new().insert(Header {
                key: RETRY_COUNT_HEADER,
                value: Some(value.as_str()),
            }));
        }

        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| IngestError::kafka(e.to_string()))?;

        debug!(
            topic = %message.topic,
            key = %message.key,
            retry_count = ?message.retry_count,
            "Produced message"
        );
        Ok(())
    }
}
