//! Shared Kafka client configuration for the catalog ingestion binaries.
//!
//! Every binary talks to the same cluster with the same credentials; this
//! crate turns environment variables into consumer and producer clients.
//!
//! ## Usage
//!
//! ```ignore
//! use catalog_kafka::{create_consumer, create_producer, KafkaConfig};
//!
//! let config = KafkaConfig::from_env("localhost:9092", "catalog-ingest", "catalog-ingest");
//! let consumer = create_consumer(&config)?;
//! let producer = create_producer(&config)?;
//! ```

use std::env;

use anyhow::Result;
use rdkafka::config::ClientConfig;

/// Connection settings shared by consumers and producers.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Kafka broker address (e.g., "localhost:9092")
    pub broker: String,
    /// Client ID reported to the broker
    pub client_id: String,
    /// Consumer group ID
    pub group_id: String,
    /// SASL username (enables SASL/SSL if set)
    pub username: Option<String>,
    /// SASL password (required if username is set)
    pub password: Option<String>,
    /// Custom CA certificate in PEM format
    pub ssl_ca_pem: Option<String>,
}

impl KafkaConfig {
    pub fn new(
        broker: impl Into<String>,
        client_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            broker: broker.into(),
            client_id: client_id.into(),
            group_id: group_id.into(),
            username: None,
            password: None,
            ssl_ca_pem: None,
        }
    }

    /// Create a KafkaConfig from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKER` - Broker address (uses provided default if not set)
    /// - `KAFKA_GROUP_ID` - Consumer group (uses provided default if not set)
    /// - `KAFKA_USERNAME` - SASL username (optional)
    /// - `KAFKA_PASSWORD` - SASL password (optional)
    /// - `KAFKA_SSL_CA_PEM` - Custom CA cert in PEM format (optional)
    pub fn from_env(
        default_broker: &str,
        client_id: impl Into<String>,
        default_group_id: &str,
    ) -> Self {
        Self {
            broker: env::var("KAFKA_BROKER").unwrap_or_else(|_| default_broker.to_string()),
            client_id: client_id.into(),
            group_id: env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| default_group_id.to_string()),
            username: env::var("KAFKA_USERNAME").ok(),
            password: env::var("KAFKA_PASSWORD").ok(),
            ssl_ca_pem: env::var("KAFKA_SSL_CA_PEM").ok(),
        }
    }

    /// Set SASL credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Use a different consumer group, keeping everything else.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.broker)
            .set("client.id", &self.client_id);

        // If SASL credentials are provided, enable SASL/SSL (for managed Kafka)
        // Otherwise, use plaintext (for local development)
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);

            if let Some(ca_pem) = &self.ssl_ca_pem {
                client_config.set("ssl.ca.pem", ca_pem);
            }
        }

        client_config
    }
}

/// Create a consumer that leaves offset commits to the caller.
///
/// Offsets are only committed once a record has been fully handled, so a
/// crash redelivers whatever was in flight.
pub fn create_consumer(config: &KafkaConfig) -> Result<StreamConsumer> {
    Ok(config
        .client_config()
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "6000")
        .create()?)
}

/// Create a producer that waits for broker acknowledgement of each message.
pub fn create_producer(config: &KafkaConfig) -> Result<FutureProducer> {
    Ok(config
        .client_config()
        .set("compression.type", "zstd")
        .set("message.timeout.ms", "5000")
        .set("acks", "all")
        .set("enable.idempotence", "true")
        .create()?)
}

// Re-export commonly used rdkafka types for convenience
pub use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
pub use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
pub use rdkafka::producer::{FutureProducer, FutureRecord};
pub use rdkafka::util::Timeout;
pub use rdkafka::{Offset, TopicPartitionList};
