//! Embedding generation.
//!
//! Two call paths share the [`EmbeddingProvider`] seam:
//!
//! - [`EmbeddingClient`] is used on the live ingestion path. It is guarded by
//!   the `embedding` circuit breaker, makes one bounded attempt per call and
//!   falls back to a placeholder vector instead of failing.
//! - [`PersistentEmbedder`] is used by the offline backfill job. It retries
//!   forever with exponential backoff and never produces a placeholder.

mod client;
mod images;
mod ollama;
mod persistent;
mod vectors;

pub use client::{EmbeddingClient, DEFAULT_EMBEDDING_TIMEOUT};
pub use images::ImageResolver;
pub use ollama::{OllamaProvider, DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_MODEL};
pub use persistent::PersistentEmbedder;
pub use vectors::{fallback_vector, shape_vector};

use async_trait::async_trait;

use crate::errors::EmbeddingError;

/// Abstracts the embedding service.
///
/// Implementations return raw vectors; sizing and normalization to the
/// deployment's dimensions happen in the callers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a piece of text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a base64-encoded image.
    async fn embed_image(&self, image_base64: &str) -> Result<Vec<f32>, EmbeddingError>;
}
