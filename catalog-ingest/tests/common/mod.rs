//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use catalog_ingest::embedding::{EmbeddingClient, EmbeddingProvider, ImageResolver};
use catalog_ingest::errors::{EmbeddingError, IngestError};
use catalog_ingest::pool::{IngestionWorkerPool, PoolConfig};
use catalog_ingest::processor::{FailureRouter, RecordProcessor};
use catalog_ingest::queue::{
    DeadLetterPublisher, GuardedProducer, LogProducer, MemoryLog, OutboundMessage,
};
use catalog_ingest_breaker::config::{BROKER, EMBEDDING, SEARCH_INDEX};
use catalog_ingest_breaker::CircuitBreakerRegistry;
use catalog_ingest_repository::{SearchIndexError, SearchIndexProvider};
use catalog_ingest_shared::{EmbeddingDims, ProductDocument, ProductRecord, DEFAULT_MAX_RETRIES};

pub const INPUT_TOPIC: &str = "products";
pub const FAILURE_TOPIC: &str = "products-retry";
pub const DEAD_LETTER_TOPIC: &str = "dead-letter-queue";

/// In-memory index keyed by document id.
#[derive(Default)]
pub struct MockIndex {
    pub failing: AtomicBool,
    /// Writes still to be refused before the index recovers.
    pub failures_left: AtomicUsize,
    pub upserts: AtomicUsize,
    pub documents: Mutex<HashMap<String, ProductDocument>>,
}

impl MockIndex {
    pub fn failing() -> Self {
        let index = Self::default();
        index.failing.store(true, Ordering::SeqCst);
        index
    }

    /// An index that refuses the first `failures` writes.
    pub fn failing_for(failures: usize) -> Self {
        let index = Self::default();
        index.failures_left.store(failures, Ordering::SeqCst);
        index
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.documents.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn insert(&self, document: ProductDocument) {
        self.documents
            .lock()
            .unwrap()
            .insert(document.id().to_string(), document);
    }

    pub fn get(&self, id: &str) -> Option<ProductDocument> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchIndexProvider for MockIndex {
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        Ok(())
    }

    async fn upsert_product(&self, document: &ProductDocument) -> Result<(), SearchIndexError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused || self.failing.load(Ordering::SeqCst) {
            return Err(SearchIndexError::connection("connection refused"));
        }
        self.insert(document.clone());
        Ok(())
    }

    async fn find_fallback_products(
        &self,
        limit: usize,
    ) -> Result<Vec<ProductDocument>, SearchIndexError> {
        let mut documents: Vec<_> = self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|document| document.has_fallback_embedding())
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.id().cmp(b.id()));
        documents.truncate(limit);
        Ok(documents)
    }
}

/// Embedding provider returning a constant vector, or failing while unhealthy.
pub struct ScriptedProvider {
    pub healthy: AtomicBool,
    pub calls: AtomicUsize,
    pub dims: usize,
}

impl ScriptedProvider {
    pub fn healthy(dims: usize) -> Self {
        Self {
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            dims,
        }
    }

    pub fn down(dims: usize) -> Self {
        let provider = Self::healthy(dims);
        provider.healthy.store(false, Ordering::SeqCst);
        provider
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(vec![0.5; self.dims])
        } else {
            Err(EmbeddingError::transport("connection refused"))
        }
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.answer()
    }

    async fn embed_image(&self, _image_base64: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.answer()
    }
}

/// Producer for a broker that is down.
#[derive(Default)]
pub struct UnreachableProducer {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl LogProducer for UnreachableProducer {
    async fn send(&self, _message: OutboundMessage) -> Result<(), IngestError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(IngestError::kafka("broker transport failure"))
    }
}

/// Producer whose broker comes back after a number of failed sends.
pub struct FlakyProducer {
    pub attempts: AtomicUsize,
    failures: usize,
    log: Arc<MemoryLog>,
}

impl FlakyProducer {
    pub fn new(log: Arc<MemoryLog>, failures: usize) -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            failures,
            log,
        }
    }
}

#[async_trait]
impl LogProducer for FlakyProducer {
    async fn send(&self, message: OutboundMessage) -> Result<(), IngestError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(IngestError::kafka("broker transport failure"));
        }
        self.log.send(message).await
    }
}

pub fn record(id: &str) -> ProductRecord {
    ProductRecord::new(id, format!("Product {}", id))
        .with_description("Waterproof hiking boot")
        .with_category("footwear")
        .with_price(129.0)
}

pub fn payload(record: &ProductRecord) -> Vec<u8> {
    serde_json::to_vec(record).unwrap()
}

/// Worker pool over `log`, with one worker so records settle in order.
pub fn worker_pool(
    log: &Arc<MemoryLog>,
    index: Arc<MockIndex>,
    provider: Arc<ScriptedProvider>,
    registry: Arc<CircuitBreakerRegistry>,
    producer: Arc<dyn LogProducer>,
) -> IngestionWorkerPool {
    worker_pool_of(log, index, provider, registry, producer, 1)
}

/// Worker pool over `log` with `worker_count` concurrent workers.
pub fn worker_pool_of(
    log: &Arc<MemoryLog>,
    index: Arc<MockIndex>,
    provider: Arc<ScriptedProvider>,
    registry: Arc<CircuitBreakerRegistry>,
    producer: Arc<dyn LogProducer>,
    worker_count: usize,
) -> IngestionWorkerPool {
    let embeddings = EmbeddingClient::new(
        provider,
        registry.get_breaker(EMBEDDING),
        ImageResolver::new(std::env::temp_dir()),
        EmbeddingDims::default(),
    );
    let processor = RecordProcessor::new(
        Arc::new(embeddings),
        index,
        registry.get_breaker(SEARCH_INDEX),
        INPUT_TOPIC,
    );
    let guarded = GuardedProducer::new(producer, registry.get_breaker(BROKER));
    let router = FailureRouter::new(
        guarded.clone(),
        DeadLetterPublisher::new(guarded, Some(DEAD_LETTER_TOPIC.to_string())),
        FAILURE_TOPIC,
        DEFAULT_MAX_RETRIES,
    );

    IngestionWorkerPool::with_config(
        Arc::new(log.consumer(INPUT_TOPIC)),
        Arc::new(processor),
        Arc::new(router),
        registry,
        PoolConfig {
            worker_count,
            ..PoolConfig::default()
        },
    )
}
