//! Search index provider trait definition.

use async_trait::async_trait;
use catalog_ingest_shared::ProductDocument;

use crate::errors::SearchIndexError;

/// Abstracts the underlying search index implementation.
///
/// Implementations are shared between all ingestion workers and must tolerate
/// concurrent calls. The pipeline does no locking of its own over the index;
/// write idempotence comes from keying every document by its product id.
///
/// # Index Initialization
///
/// Binaries call `ensure_index_exists` during startup so the index, its alias
/// and the vector field mappings are in place before the first write.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Ensure the search index and its alias exist, creating them if necessary.
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError>;

    /// Write a product document keyed by its id.
    ///
    /// Writing the same id twice leaves exactly one document holding the
    /// content of the latest write.
    async fn upsert_product(&self, document: &ProductDocument) -> Result<(), SearchIndexError>;

    /// Fetch up to `limit` documents whose text or image embedding is a
    /// fallback placeholder.
    async fn find_fallback_products(
        &self,
        limit: usize,
    ) -> Result<Vec<ProductDocument>, SearchIndexError>;
}
