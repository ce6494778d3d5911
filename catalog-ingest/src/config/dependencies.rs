//! Dependency initialization and wiring for the ingestion binaries.

use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use catalog_ingest_breaker::config::{BROKER, EMBEDDING, SEARCH_INDEX};
use catalog_ingest_breaker::CircuitBreakerRegistry;
use catalog_ingest_repository::opensearch::IndexConfig;
use catalog_ingest_repository::{OpenSearchProvider, SearchIndexProvider};

use crate::backfill::EmbeddingBackfill;
use crate::config::IngestConfig;
use crate::embedding::{
    EmbeddingClient, EmbeddingProvider, ImageResolver, OllamaProvider, PersistentEmbedder,
};
use crate::pool::{IngestionWorkerPool, PoolConfig};
use crate::processor::{FailureRouter, RecordProcessor};
use crate::queue::{
    DeadLetterPublisher, GuardedProducer, KafkaLogConsumer, KafkaLogProducer, LogProducer,
};
use crate::retry::RetryCoordinator;
use crate::IndexingError;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connecting and creating the index at a fixed interval until both succeed.
    Retry,
}

impl ConnectionMode {
    /// Parse connection mode from environment variable.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive)
    /// Defaults to "retry" if not set or invalid.
    pub(crate) fn from_env() -> Self {
        match env::var("OPENSEARCH_CONNECTION_MODE")
            .unwrap_or_else(|_| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Shared handles every binary starts from.
///
/// The registry, producer and embedding provider are created once and
/// handed to each component, so all of them see the same breakers.
pub struct Dependencies {
    pub config: IngestConfig,
    pub registry: Arc<CircuitBreakerRegistry>,
    producer: Arc<dyn LogProducer>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
}

impl Dependencies {
    /// Initialize the breaker registry, Kafka producer and embedding provider.
    pub async fn new(config: IngestConfig) -> Result<Self, IndexingError> {
        info!(
            kafka_broker = %config.kafka.broker,
            input_topic = %config.input_topic,
            failure_topic = %config.failure_topic,
            dead_letter_topic = ?config.dead_letter_topic,
            opensearch_url = %config.opensearch_url,
            ollama_host = %config.ollama_host,
            ollama_model = %config.ollama_model,
            breaker_store = ?config.breaker_store,
            "Initializing dependencies"
        );

        let registry = config
            .breaker_store
            .clone()
            .into_registry()
            .await
            .map_err(|e| {
                IndexingError::config(format!("Failed to initialize breaker state store: {}", e))
            })?;

        let producer = KafkaLogProducer::new(&config.kafka).map_err(|e| {
            IndexingError::config(format!("Failed to create Kafka producer: {}", e))
        })?;

        info!("Kafka producer created");

        let embedding_provider = OllamaProvider::new(&config.ollama_host, &config.ollama_model);

        Ok(Self::from_parts(
            config,
            Arc::new(registry),
            Arc::new(producer),
            Arc::new(embedding_provider),
        ))
    }

    /// Assemble dependencies from already constructed parts.
    pub fn from_parts(
        config: IngestConfig,
        registry: Arc<CircuitBreakerRegistry>,
        producer: Arc<dyn LogProducer>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            registry,
            producer,
            embedding_provider,
        }
    }

    /// Connect to OpenSearch and make sure the products index exists.
    pub async fn search_index(&self) -> Result<Arc<dyn SearchIndexProvider>, IndexingError> {
        let provider = Self::connect_to_opensearch(
            &self.config.opensearch_url,
            self.config.index.clone(),
            self.config.connection_mode,
            self.config.connection_retry_interval,
        )
        .await?;

        info!("OpenSearch connection established");

        Ok(Arc::new(provider))
    }

    /// Producer guarded by the broker breaker.
    pub fn guarded_producer(&self) -> GuardedProducer {
        GuardedProducer::new(self.producer.clone(), self.registry.get_breaker(BROKER))
    }

    pub fn dead_letters(&self) -> DeadLetterPublisher {
        DeadLetterPublisher::new(
            self.guarded_producer(),
            self.config.dead_letter_topic.clone(),
        )
    }

    fn image_resolver(&self) -> ImageResolver {
        ImageResolver::new(self.config.image_root.clone())
    }

    /// The breaker-protected embedding client used on the ingest path.
    pub fn embedding_client(&self) -> EmbeddingClient {
        EmbeddingClient::new(
            self.embedding_provider.clone(),
            self.registry.get_breaker(EMBEDDING),
            self.image_resolver(),
            self.config.dims,
        )
        .with_timeout(self.config.embedding_timeout)
    }

    /// Worker pool reading the input topic.
    pub fn worker_pool(
        &self,
        search_index: Arc<dyn SearchIndexProvider>,
    ) -> Result<IngestionWorkerPool, IndexingError> {
        let consumer =
            KafkaLogConsumer::new(&self.config.kafka, &[self.config.input_topic.clone()])
                .map_err(|e| {
                    IndexingError::config(format!("Failed to create Kafka consumer: {}", e))
                })?;

        info!(topic = %self.config.input_topic, "Kafka consumer created");

        let processor = RecordProcessor::new(
            Arc::new(self.embedding_client()),
            search_index,
            self.registry.get_breaker(SEARCH_INDEX),
            self.config.input_topic.clone(),
        )
        .with_index_timeout(self.config.index_timeout);

        let router = FailureRouter::new(
            self.guarded_producer(),
            self.dead_letters(),
            self.config.failure_topic.clone(),
            self.config.retry_policy.max_retries,
        );

        Ok(IngestionWorkerPool::with_config(
            Arc::new(consumer),
            Arc::new(processor),
            Arc::new(router),
            self.registry.clone(),
            PoolConfig {
                worker_count: self.config.worker_count,
                ..PoolConfig::default()
            },
        ))
    }

    /// Retry coordinator reading the failure topic with its own consumer group.
    pub fn retry_coordinator(&self) -> Result<RetryCoordinator, IndexingError> {
        let kafka = self
            .config
            .kafka
            .clone()
            .with_group_id(self.config.retry_group_id.clone());
        let consumer = KafkaLogConsumer::new(&kafka, &[self.config.failure_topic.clone()])
            .map_err(|e| {
                IndexingError::config(format!("Failed to create Kafka consumer: {}", e))
            })?;

        info!(
            topic = %self.config.failure_topic,
            group_id = %kafka.group_id,
            "Kafka consumer created"
        );

        Ok(RetryCoordinator::new(
            Arc::new(consumer),
            self.guarded_producer(),
            self.dead_letters(),
            self.config.failure_topic.clone(),
            self.config.retry_policy.clone(),
        )
        .with_idle_timeout(self.config.retry_idle_timeout)
        .with_max_per_pass(self.config.retry_max_per_pass)
        .with_poll_interval(self.config.retry_poll_interval))
    }

    /// Backfill job replacing fallback embeddings.
    pub fn backfill(&self, search_index: Arc<dyn SearchIndexProvider>) -> EmbeddingBackfill {
        let embedder = PersistentEmbedder::new(
            self.embedding_provider.clone(),
            self.image_resolver(),
            self.config.dims,
        )
        .with_attempt_timeout(self.config.embedding_timeout);

        EmbeddingBackfill::new(search_index, embedder)
            .with_batch_size(self.config.backfill_batch_size)
    }

    /// Connect to OpenSearch and create the index, with retry logic based on
    /// connection mode.
    ///
    /// The client only reaches the cluster when the index is ensured, so both
    /// steps form one attempt.
    async fn connect_to_opensearch(
        url: &str,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexingError> {
        with_connection_retry(url, mode, retry_interval, || {
            let index_config = index_config.clone();
            async move {
                let provider = OpenSearchProvider::new(url, index_config)
                    .await
                    .map_err(|e| format!("Failed to connect to OpenSearch: {}", e))?;
                provider
                    .ensure_index_exists()
                    .await
                    .map_err(|e| format!("Failed to ensure index exists: {}", e))?;
                Ok(provider)
            }
        })
        .await
    }
}

/// Run `connect` until it succeeds, or once in fail-fast mode.
async fn with_connection_retry<T, F, Fut>(
    url: &str,
    mode: ConnectionMode,
    retry_interval: Duration,
    mut connect: F,
) -> Result<T, IndexingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    loop {
        match connect().await {
            Ok(connected) => return Ok(connected),
            Err(message) => match mode {
                ConnectionMode::FailFast => return Err(IndexingError::config(message)),
                ConnectionMode::Retry => {
                    warn!(
                        opensearch_url = %url,
                        error = %message,
                        retry_interval_secs = retry_interval.as_secs(),
                        "Failed to connect to OpenSearch, retrying..."
                    );
                    sleep(retry_interval).await;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn flaky(
        attempts: &AtomicUsize,
        failures: usize,
    ) -> impl Future<Output = Result<usize, String>> + '_ {
        async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < failures {
                Err("Failed to ensure index exists: connection refused".to_string())
            } else {
                Ok(attempt)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_mode_waits_for_index_creation() {
        let attempts = AtomicUsize::new(0);

        let connected = with_connection_retry(
            "http://localhost:9200",
            ConnectionMode::Retry,
            Duration::from_secs(5),
            || flaky(&attempts, 2),
        )
        .await
        .unwrap();

        assert_eq!(connected, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fail_fast_mode_gives_up_after_one_attempt() {
        let attempts = AtomicUsize::new(0);

        let result = with_connection_retry(
            "http://localhost:9200",
            ConnectionMode::FailFast,
            Duration::from_secs(5),
            || flaky(&attempts, 2),
        )
        .await;

        assert!(
            matches!(result, Err(IndexingError::ConfigError(message)) if message.contains("index"))
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
