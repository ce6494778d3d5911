//! Offline replacement of fallback embeddings.
//!
//! Documents indexed while the embedding service was unavailable carry
//! placeholder vectors, marked `fallback`. The backfill job looks them up,
//! re-embeds the placeholder side(s) through the [`PersistentEmbedder`]
//! and upserts the document by id.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use catalog_ingest_repository::SearchIndexProvider;
use catalog_ingest_shared::{EmbeddingSource, ProductDocument};

use crate::embedding::PersistentEmbedder;
use crate::errors::IngestError;

/// Default number of documents handled in one run.
pub const DEFAULT_BACKFILL_BATCH_SIZE: usize = 100;

/// Counters for one backfill run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub scanned: usize,
    pub text_replaced: usize,
    pub image_replaced: usize,
    /// Fallback images with no local file, re-marked absent so later runs
    /// move past them.
    pub skipped: usize,
    pub failed: usize,
}

pub struct EmbeddingBackfill {
    search_index: Arc<dyn SearchIndexProvider>,
    embedder: PersistentEmbedder,
    batch_size: usize,
}

impl EmbeddingBackfill {
    pub fn new(search_index: Arc<dyn SearchIndexProvider>, embedder: PersistentEmbedder) -> Self {
        Self {
            search_index,
            embedder,
            batch_size: DEFAULT_BACKFILL_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Process one batch of fallback-embedded documents.
    ///
    /// Waits as long as it takes for the embedding service. Index write
    /// failures are counted and the document is left for the next run.
    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn run(&self) -> Result<BackfillReport, IngestError> {
        let documents = self
            .search_index
            .find_fallback_products(self.batch_size)
            .await?;
        info!(count = documents.len(), "Found documents with fallback embeddings");

        let mut report = BackfillReport {
            scanned: documents.len(),
            ..Default::default()
        };

        for document in documents {
            self.backfill_document(document, &mut report).await?;
        }

        info!(
            scanned = report.scanned,
            text_replaced = report.text_replaced,
            image_replaced = report.image_replaced,
            skipped = report.skipped,
            failed = report.failed,
            "Backfill run complete"
        );
        Ok(report)
    }

    async fn backfill_document(
        &self,
        mut document: ProductDocument,
        report: &mut BackfillReport,
    ) -> Result<(), IngestError> {
        let mut text_replaced = false;
        let mut image_replaced = false;
        let mut image_unavailable = false;

        if document.text_embedding_source == EmbeddingSource::Fallback {
            let embedding = self
                .embedder
                .embed_text(&document.record.embedding_text())
                .await?;
            document.set_text_embedding(embedding);
            text_replaced = true;
        }

        if document.image_embedding_source == EmbeddingSource::Fallback {
            let embedding = match document.record.image.clone() {
                Some(image) => self.embedder.embed_image(&image).await?,
                None => None,
            };
            match embedding {
                Some(embedding) => {
                    document.set_image_embedding(embedding);
                    image_replaced = true;
                }
                None => {
                    document.image_embedding_source = EmbeddingSource::Absent;
                    image_unavailable = true;
                }
            }
        }

        if !text_replaced && !image_replaced && !image_unavailable {
            return Ok(());
        }

        document.indexed_at = Utc::now();
        match self.search_index.upsert_product(&document).await {
            Ok(()) => {
                report.text_replaced += usize::from(text_replaced);
                report.image_replaced += usize::from(image_replaced);
                report.skipped += usize::from(image_unavailable);
            }
            Err(e) => {
                warn!(record_id = %document.id(), error = %e, "Failed to write backfilled document");
                report.failed += 1;
            }
        }
        Ok(())
    }
}
