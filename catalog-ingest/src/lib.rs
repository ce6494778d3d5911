//! # Catalog Ingest
//!
//! Product catalog ingestion: consumes product records from Kafka, embeds
//! their text and images, and indexes them into OpenSearch. Every external
//! dependency sits behind a circuit breaker so an outage degrades the
//! pipeline instead of stopping it.
//!
//! ## Architecture
//!
//! 1. **Pool**: Workers pull records from the input topic
//! 2. **Processor**: Embeds a record and upserts it into the index
//! 3. **Failure routing**: Failed records go to the failure topic, or to
//!    the dead-letter topic once their retries are exhausted
//! 4. **Retry**: The coordinator resubmits failed records after a backoff
//! 5. **Backfill**: Replaces fallback embeddings once the service is back
//!
//! ## Modules
//!
//! - [`config`]: Environment configuration and dependency wiring
//! - [`embedding`]: Embedding providers and the breaker-aware client
//! - [`processor`]: Record processing and failure routing
//! - [`queue`]: Log consumer/producer seams over Kafka
//! - [`pool`]: Ingestion worker pool
//! - [`retry`]: Retry coordinator and backoff policy
//! - [`backfill`]: Fallback embedding backfill
//! - [`errors`]: Error types for the pipeline

pub mod backfill;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod pool;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod telemetry;

pub use config::{Dependencies, IngestConfig};
pub use errors::{EmbeddingError, IngestError};

use thiserror::Error;

/// Errors that can occur during startup or execution of a binary.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
