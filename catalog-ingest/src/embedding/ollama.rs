//! Embedding provider backed by an Ollama server.

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::errors::EmbeddingError;

/// Default Ollama server URL.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Default model used for both description and embedding.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama2";

const IMAGE_DESCRIPTION_PROMPT: &str = "Describe this image in detail for embedding purposes.";

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    images: Vec<&'a str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for the Ollama HTTP API.
///
/// Text goes straight to `/api/embeddings`. Images are first described by
/// the model through `/api/generate` and the description is embedded.
///
/// # Example
///
/// ```ignore
/// let provider = OllamaProvider::new("http://localhost:11434", "llama2");
/// let vector = provider.embed_text("Oak dining chair").await?;
/// ```
pub struct OllamaProvider {
    client: ReqwestClient,
    host: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: ReqwestClient::new(),
            host: host.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, EmbeddingError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.host, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response: EmbeddingsResponse = self
            .post_json(
                "/api/embeddings",
                &EmbeddingsRequest {
                    model: &self.model,
                    prompt: text,
                },
            )
            .await?;
        Ok(response.embedding)
    }

    async fn embed_image(&self, image_base64: &str) -> Result<Vec<f32>, EmbeddingError> {
        let generated: GenerateResponse = self
            .post_json(
                "/api/generate",
                &GenerateRequest {
                    model: &self.model,
                    prompt: IMAGE_DESCRIPTION_PROMPT,
                    stream: false,
                    images: vec![image_base64],
                },
            )
            .await?;

        let description = generated.response.trim();
        if description.is_empty() {
            return Err(EmbeddingError::malformed("empty image description"));
        }
        debug!(description_len = description.len(), "Generated image description");

        self.embed_text(description).await
    }
}
