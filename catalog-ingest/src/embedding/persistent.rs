use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

use catalog_ingest_shared::{Embedding, EmbeddingDims, ProductImage};

use crate::embedding::vectors::shape_vector;
use crate::embedding::{EmbeddingProvider, ImageResolver, DEFAULT_EMBEDDING_TIMEOUT};
use crate::errors::EmbeddingError;

/// Embedding path for offline batch jobs.
///
/// Keeps retrying with jittered exponential backoff until the service
/// returns a usable vector. There is no circuit breaker and no placeholder:
/// a batch job would rather wait than write another fallback vector.
pub struct PersistentEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    images: ImageResolver,
    dims: EmbeddingDims,
    attempt_timeout: Duration,
    base_millis: u64,
    factor: u64,
    max_delay: Duration,
}

impl PersistentEmbedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        images: ImageResolver,
        dims: EmbeddingDims,
    ) -> Self {
        Self {
            provider,
            images,
            dims,
            attempt_timeout: DEFAULT_EMBEDDING_TIMEOUT,
            base_millis: 10,
            factor: 10,
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Override the backoff curve: `base_millis^n * factor`, capped at `max_delay`.
    pub fn with_backoff(mut self, base_millis: u64, factor: u64, max_delay: Duration) -> Self {
        self.base_millis = base_millis;
        self.factor = factor;
        self.max_delay = max_delay;
        self
    }

    pub async fn embed_text(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let vector = Retry::spawn(self.strategy(), || {
            self.attempt("text", self.dims.text, self.provider.embed_text(text))
        })
        .await?;
        Ok(Embedding::real(vector))
    }

    /// Embed the image a record points to, or `None` if there is no local
    /// file to embed.
    pub async fn embed_image(
        &self,
        image: &ProductImage,
    ) -> Result<Option<Embedding>, EmbeddingError> {
        let Some(encoded) = self.images.load_base64(image).await else {
            return Ok(None);
        };
        let vector = Retry::spawn(self.strategy(), || {
            self.attempt("image", self.dims.image, self.provider.embed_image(&encoded))
        })
        .await?;
        Ok(Some(Embedding::real(vector)))
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base_millis)
            .factor(self.factor)
            .max_delay(self.max_delay)
            .map(jitter)
    }

    async fn attempt<F>(
        &self,
        kind: &'static str,
        dims: usize,
        call: F,
    ) -> Result<Vec<f32>, EmbeddingError>
    where
        F: Future<Output = Result<Vec<f32>, EmbeddingError>>,
    {
        let result = match timeout(self.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(
                u64::try_from(self.attempt_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
        .and_then(|raw| shape_vector(raw, dims));

        if let Err(e) = &result {
            warn!(kind = kind, error = %e, "Embedding attempt failed, retrying");
        }
        result
    }
}
