//! Error types for the catalog ingestion pipeline.

use catalog_ingest_repository::SearchIndexError;
use thiserror::Error;

/// Errors that can occur while moving records through the pipeline.
///
/// None of these are fatal for the pipeline as a whole: a failure while
/// handling one record is logged and routed, and the worker moves on.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Error parsing or decoding data.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Error encoding a message for the log.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Error from the search index.
    #[error("Index error: {0}")]
    IndexError(#[from] SearchIndexError),

    /// Error from the embedding service.
    #[error("Embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    /// The named dependency's circuit breaker refused the call.
    #[error("Circuit breaker for {0} is open")]
    BreakerOpen(String),
}

impl IngestError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    pub fn breaker_open(dependency: impl Into<String>) -> Self {
        Self::BreakerOpen(dependency.into())
    }
}

impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Failures of a single call to the embedding service.
///
/// Every variant counts as a failure for the embedding circuit breaker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Embedding request timed out after {0} ms")]
    Timeout(u64),

    #[error("Embedding service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Embedding transport error: {0}")]
    Transport(String),

    #[error("Malformed embedding response: {0}")]
    Malformed(String),
}

impl EmbeddingError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
