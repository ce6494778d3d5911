//! # Catalog Ingest Shared
//!
//! This crate defines the data structures shared across the catalog ingestion
//! pipeline: the product records read from the input log, the documents written
//! to the search index, and the failure envelopes that carry retry bookkeeping.

pub mod types;

pub use types::embedding::{
    Embedding, EmbeddingDims, EmbeddingSource, DEFAULT_IMAGE_EMBEDDING_DIMS,
    DEFAULT_TEXT_EMBEDDING_DIMS,
};
pub use types::failure_envelope::{FailureEnvelope, DEFAULT_MAX_RETRIES};
pub use types::product_document::ProductDocument;
pub use types::product_record::{ProductImage, ProductRecord, RecordDefect};
