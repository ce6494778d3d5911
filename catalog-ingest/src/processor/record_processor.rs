use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use catalog_ingest_breaker::CircuitBreaker;
use catalog_ingest_repository::{SearchIndexError, SearchIndexProvider};
use catalog_ingest_shared::{EmbeddingSource, FailureEnvelope, ProductDocument, ProductRecord};

use crate::embedding::EmbeddingClient;

/// Default deadline of one index write.
pub const DEFAULT_INDEX_TIMEOUT: Duration = Duration::from_secs(10);

/// Summary of a successfully indexed record.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub id: String,
    pub text_source: EmbeddingSource,
    pub image_source: EmbeddingSource,
}

/// Per-record pipeline: embed, attach, upsert.
///
/// Embedding never fails (the client falls back), so the only way a record
/// fails is the index write. A failed record comes back as a
/// [`FailureEnvelope`] and nothing is written for that attempt.
pub struct RecordProcessor {
    embeddings: Arc<EmbeddingClient>,
    search_index: Arc<dyn SearchIndexProvider>,
    index_breaker: Arc<CircuitBreaker>,
    index_timeout: Duration,
    destination: String,
}

impl RecordProcessor {
    /// `destination` is the topic failed records are resubmitted to.
    pub fn new(
        embeddings: Arc<EmbeddingClient>,
        search_index: Arc<dyn SearchIndexProvider>,
        index_breaker: Arc<CircuitBreaker>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            embeddings,
            search_index,
            index_breaker,
            index_timeout: DEFAULT_INDEX_TIMEOUT,
            destination: destination.into(),
        }
    }

    pub fn with_index_timeout(mut self, index_timeout: Duration) -> Self {
        self.index_timeout = index_timeout;
        self
    }

    /// Process one record.
    ///
    /// `previous_retry_count` is the retry count the record arrived with, 0
    /// for a record seen for the first time.
    #[instrument(skip_all, fields(record_id = %record.id, retry_count = previous_retry_count))]
    pub async fn process(
        &self,
        record: ProductRecord,
        previous_retry_count: u32,
    ) -> Result<IndexedRecord, FailureEnvelope> {
        let text = self.embeddings.embed_text(&record.embedding_text()).await;
        let image = match &record.image {
            Some(image) => self.embeddings.embed_image(image).await,
            None => self.embeddings.image_absent(),
        };

        let document = ProductDocument::new(record, text, image);

        match self.write(&document).await {
            Ok(()) => {
                debug!(
                    text_source = %document.text_embedding_source,
                    image_source = %document.image_embedding_source,
                    "Record indexed"
                );
                Ok(IndexedRecord {
                    id: document.record.id.clone(),
                    text_source: document.text_embedding_source,
                    image_source: document.image_embedding_source,
                })
            }
            Err(e) => {
                warn!(error = %e, "Index write failed");
                Err(FailureEnvelope::new(
                    document.record,
                    previous_retry_count,
                    e.to_string(),
                    &self.destination,
                ))
            }
        }
    }

    async fn write(&self, document: &ProductDocument) -> Result<(), SearchIndexError> {
        if !self.index_breaker.allow_request().await {
            return Err(SearchIndexError::connection(
                "search index circuit breaker is open",
            ));
        }

        let result = match timeout(self.index_timeout, self.search_index.upsert_product(document))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SearchIndexError::Timeout(
                u64::try_from(self.index_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        match &result {
            Ok(()) => self.index_breaker.record_success().await,
            Err(_) => self.index_breaker.record_failure().await,
        }
        result
    }
}
