use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use catalog_ingest_breaker::CircuitBreaker;
use catalog_ingest_shared::{Embedding, EmbeddingDims, ProductImage};

use crate::embedding::vectors::{fallback_vector, shape_vector};
use crate::embedding::{EmbeddingProvider, ImageResolver};
use crate::errors::EmbeddingError;

/// Default deadline of one embedding call.
pub const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(10);

/// Latency-sensitive embedding path used while ingesting.
///
/// Every call returns a vector of the configured dimension. When the
/// `embedding` breaker is open the service is not contacted at all; when it
/// is closed the service gets a single attempt bounded by a timeout. Anything
/// but a usable vector is reported to the breaker as a failure and replaced
/// by [`fallback_vector`], marked as a fallback.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    breaker: Arc<CircuitBreaker>,
    images: ImageResolver,
    dims: EmbeddingDims,
    timeout: Duration,
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        breaker: Arc<CircuitBreaker>,
        images: ImageResolver,
        dims: EmbeddingDims,
    ) -> Self {
        Self {
            provider,
            breaker,
            images,
            dims,
            timeout: DEFAULT_EMBEDDING_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dims(&self) -> EmbeddingDims {
        self.dims
    }

    /// A placeholder image embedding for records without a readable image.
    ///
    /// Marked absent rather than fallback, so the backfill does not keep
    /// picking up documents it has no image for.
    pub fn image_absent(&self) -> Embedding {
        Embedding::absent(fallback_vector(self.dims.image))
    }

    pub async fn embed_text(&self, text: &str) -> Embedding {
        if text.trim().is_empty() {
            debug!("Empty text, using fallback vector");
            return Embedding::fallback(fallback_vector(self.dims.text));
        }
        self.guarded("text", self.dims.text, self.provider.embed_text(text))
            .await
    }

    /// Embed the image a record points to.
    ///
    /// Images that cannot be read locally get an absent placeholder without
    /// involving the breaker, since the embedding service was never asked.
    pub async fn embed_image(&self, image: &ProductImage) -> Embedding {
        let Some(encoded) = self.images.load_base64(image).await else {
            return self.image_absent();
        };
        self.guarded("image", self.dims.image, self.provider.embed_image(&encoded))
            .await
    }

    async fn guarded<F>(&self, kind: &'static str, dims: usize, call: F) -> Embedding
    where
        F: Future<Output = Result<Vec<f32>, EmbeddingError>>,
    {
        if !self.breaker.allow_request().await {
            debug!(kind = kind, "Embedding breaker open, using fallback vector");
            return Embedding::fallback(fallback_vector(dims));
        }

        let outcome = match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(
                u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
        .and_then(|raw| shape_vector(raw, dims));

        match outcome {
            Ok(vector) => {
                self.breaker.record_success().await;
                Embedding::real(vector)
            }
            Err(e) => {
                self.breaker.record_failure().await;
                warn!(kind = kind, error = %e, "Embedding call failed, using fallback vector");
                Embedding::fallback(fallback_vector(dims))
            }
        }
    }
}
