//! Settings read from the environment.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use catalog_ingest_breaker::BreakerStoreSource;
use catalog_ingest_repository::IndexConfig;
use catalog_ingest_shared::{EmbeddingDims, DEFAULT_MAX_RETRIES};
use catalog_kafka::KafkaConfig;

use crate::backfill::DEFAULT_BACKFILL_BATCH_SIZE;
use crate::config::ConnectionMode;
use crate::embedding::{DEFAULT_EMBEDDING_TIMEOUT, DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_MODEL};
use crate::pool::DEFAULT_WORKER_COUNT;
use crate::processor::DEFAULT_INDEX_TIMEOUT;
use crate::retry::{
    RetryPolicy, DEFAULT_BASE_BACKOFF, DEFAULT_IDLE_TIMEOUT, DEFAULT_JITTER_RATIO,
    DEFAULT_MAX_BACKOFF, DEFAULT_MAX_PER_PASS, DEFAULT_POLL_INTERVAL,
};
use crate::IndexingError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default consumer group of the ingestion workers.
const DEFAULT_KAFKA_GROUP_ID: &str = "catalog-ingest";

/// Default consumer group of the retry coordinator.
const DEFAULT_RETRY_GROUP_ID: &str = "catalog-retry-coordinator";

const DEFAULT_INPUT_TOPIC: &str = "products";
const DEFAULT_DEAD_LETTER_TOPIC: &str = "dead-letter-queue";
const DEFAULT_INDEX_ALIAS: &str = "products";
const DEFAULT_IMAGE_ROOT: &str = "./data/images";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Everything the binaries can be configured with.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub kafka: KafkaConfig,
    pub retry_group_id: String,
    pub input_topic: String,
    pub failure_topic: String,
    /// `None` disables dead-letter publishing.
    pub dead_letter_topic: Option<String>,
    pub opensearch_url: String,
    pub index: IndexConfig,
    pub connection_mode: ConnectionMode,
    pub connection_retry_interval: Duration,
    pub ollama_host: String,
    pub ollama_model: String,
    pub embedding_timeout: Duration,
    pub index_timeout: Duration,
    pub dims: EmbeddingDims,
    pub image_root: PathBuf,
    pub worker_count: usize,
    pub retry_policy: RetryPolicy,
    pub retry_poll_interval: Duration,
    pub retry_idle_timeout: Duration,
    pub retry_max_per_pass: usize,
    pub backfill_batch_size: usize,
    pub breaker_store: BreakerStoreSource,
}

impl IngestConfig {
    /// Read the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKER`, `KAFKA_GROUP_ID`, `KAFKA_USERNAME`, `KAFKA_PASSWORD`,
    ///   `KAFKA_SSL_CA_PEM`: Kafka connection (see [`KafkaConfig::from_env`])
    /// - `RETRY_GROUP_ID`: Consumer group of the retry coordinator
    /// - `INPUT_TOPIC`: Topic with product records (default: products)
    /// - `FAILURE_TOPIC`: Failure log (default: `<INPUT_TOPIC>-retry`)
    /// - `DEAD_LETTER_TOPIC`: Dropped records (default: dead-letter-queue, empty disables)
    /// - `OPENSEARCH_URL`, `INDEX_ALIAS`, `PRODUCTS_INDEX_VERSION`
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `OLLAMA_HOST`, `OLLAMA_MODEL`
    /// - `EMBEDDING_TIMEOUT_MS`, `INDEX_TIMEOUT_MS`: Per-call deadlines
    /// - `TEXT_EMBEDDING_DIMS` (384), `IMAGE_EMBEDDING_DIMS` (512)
    /// - `IMAGE_ROOT`: Directory image paths are relative to
    /// - `WORKER_COUNT`
    /// - `RETRY_BASE_BACKOFF_SECS` (5), `RETRY_MAX_BACKOFF_SECS` (300), `MAX_RETRIES` (3)
    /// - `RETRY_POLL_INTERVAL_SECS`, `RETRY_IDLE_TIMEOUT_MS`, `RETRY_MAX_PER_PASS`
    /// - `BACKFILL_BATCH_SIZE`
    /// - `BREAKER_STORE`: "memory" or "postgres" (default: memory), with `DATABASE_URL`
    ///
    /// Unparseable values fall back to their default with a warning. The only
    /// hard error is `BREAKER_STORE=postgres` without `DATABASE_URL`.
    pub fn from_env() -> Result<Self, IndexingError> {
        let kafka = KafkaConfig::from_env(
            DEFAULT_KAFKA_BROKER,
            "catalog-ingest",
            DEFAULT_KAFKA_GROUP_ID,
        );

        let input_topic = env_string("INPUT_TOPIC", DEFAULT_INPUT_TOPIC);
        let failure_topic = env::var("FAILURE_TOPIC")
            .ok()
            .filter(|topic| !topic.trim().is_empty())
            .unwrap_or_else(|| failure_topic_for(&input_topic));
        let dead_letter_topic = match env::var("DEAD_LETTER_TOPIC") {
            Ok(topic) if topic.trim().is_empty() => None,
            Ok(topic) => Some(topic),
            Err(_) => Some(DEFAULT_DEAD_LETTER_TOPIC.to_string()),
        };

        let dims = EmbeddingDims {
            text: env_dims("TEXT_EMBEDDING_DIMS", EmbeddingDims::default().text),
            image: env_dims("IMAGE_EMBEDDING_DIMS", EmbeddingDims::default().image),
        };
        let index = IndexConfig::new(
            env_string("INDEX_ALIAS", DEFAULT_INDEX_ALIAS),
            env_or("PRODUCTS_INDEX_VERSION", 0u32),
        )
        .with_dims(dims);

        let retry_policy = RetryPolicy {
            base_backoff: Duration::from_secs(env_or(
                "RETRY_BASE_BACKOFF_SECS",
                DEFAULT_BASE_BACKOFF.as_secs(),
            )),
            max_backoff: Duration::from_secs(env_or(
                "RETRY_MAX_BACKOFF_SECS",
                DEFAULT_MAX_BACKOFF.as_secs(),
            )),
            max_retries: env_or("MAX_RETRIES", DEFAULT_MAX_RETRIES),
            jitter_ratio: DEFAULT_JITTER_RATIO,
        };

        let breaker_store = match env_string("BREAKER_STORE", "memory")
            .to_lowercase()
            .as_str()
        {
            "postgres" => {
                let database_url = env::var("DATABASE_URL").map_err(|_| {
                    IndexingError::config("BREAKER_STORE=postgres requires DATABASE_URL")
                })?;
                BreakerStoreSource::postgres(database_url)
            }
            "memory" => BreakerStoreSource::memory(),
            other => {
                warn!(value = %other, "Invalid BREAKER_STORE, defaulting to 'memory'");
                BreakerStoreSource::memory()
            }
        };

        Ok(Self {
            kafka,
            retry_group_id: env_string("RETRY_GROUP_ID", DEFAULT_RETRY_GROUP_ID),
            input_topic,
            failure_topic,
            dead_letter_topic,
            opensearch_url: env_string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            index,
            connection_mode: ConnectionMode::from_env(),
            connection_retry_interval: Duration::from_secs(env_or(
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
            ollama_host: env_string("OLLAMA_HOST", DEFAULT_OLLAMA_HOST),
            ollama_model: env_string("OLLAMA_MODEL", DEFAULT_OLLAMA_MODEL),
            embedding_timeout: Duration::from_millis(env_or(
                "EMBEDDING_TIMEOUT_MS",
                millis(DEFAULT_EMBEDDING_TIMEOUT),
            )),
            index_timeout: Duration::from_millis(env_or(
                "INDEX_TIMEOUT_MS",
                millis(DEFAULT_INDEX_TIMEOUT),
            )),
            dims,
            image_root: PathBuf::from(env_string("IMAGE_ROOT", DEFAULT_IMAGE_ROOT)),
            worker_count: env_or("WORKER_COUNT", DEFAULT_WORKER_COUNT).max(1),
            retry_policy,
            retry_poll_interval: Duration::from_secs(env_or(
                "RETRY_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL.as_secs(),
            )),
            retry_idle_timeout: Duration::from_millis(env_or(
                "RETRY_IDLE_TIMEOUT_MS",
                millis(DEFAULT_IDLE_TIMEOUT),
            )),
            retry_max_per_pass: env_or("RETRY_MAX_PER_PASS", DEFAULT_MAX_PER_PASS),
            backfill_batch_size: env_or("BACKFILL_BATCH_SIZE", DEFAULT_BACKFILL_BATCH_SIZE),
            breaker_store,
        })
    }
}

/// Failure log name derived from the input topic.
pub fn failure_topic_for(input_topic: &str) -> String {
    format!("{}-retry", input_topic)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or<T: FromStr + Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    variable = %key,
                    value = %raw,
                    default = %default,
                    "Invalid value, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// A vector dimension; zero is rejected like any other invalid value.
fn env_dims(key: &str, default: usize) -> usize {
    match env_or(key, default) {
        0 => {
            warn!(
                variable = %key,
                default = default,
                "Embedding dimension must be positive, using default"
            );
            default
        }
        dims => dims,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_topic_for() {
        assert_eq!(failure_topic_for("products"), "products-retry");
    }

    #[test]
    fn test_from_env() {
        env::set_var("INPUT_TOPIC", "catalog");
        env::set_var("WORKER_COUNT", "lots");
        env::set_var("MAX_RETRIES", "5");
        env::set_var("DEAD_LETTER_TOPIC", "");
        env::set_var("TEXT_EMBEDDING_DIMS", "768");
        env::set_var("IMAGE_EMBEDDING_DIMS", "0");

        let config = IngestConfig::from_env().unwrap();

        assert_eq!(config.input_topic, "catalog");
        assert_eq!(config.failure_topic, "catalog-retry");
        assert_eq!(config.dead_letter_topic, None);
        assert_eq!(config.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(config.retry_policy.max_retries, 5);
        assert_eq!(config.retry_policy.base_backoff, Duration::from_secs(5));
        assert_eq!(config.dims.text, 768);
        assert_eq!(config.index.dims.text, 768);
        assert_eq!(config.dims.image, 512);
        assert_eq!(config.index.dims.image, 512);
        assert!(matches!(config.breaker_store, BreakerStoreSource::Memory));

        for key in [
            "INPUT_TOPIC",
            "WORKER_COUNT",
            "MAX_RETRIES",
            "DEAD_LETTER_TOPIC",
            "TEXT_EMBEDDING_DIMS",
            "IMAGE_EMBEDDING_DIMS",
        ] {
            env::remove_var(key);
        }
    }
}
