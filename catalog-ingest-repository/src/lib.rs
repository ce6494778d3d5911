//! # Catalog Ingest Repository
//!
//! This crate provides the search index seam of the ingestion pipeline: the
//! `SearchIndexProvider` trait, its error type, and a concrete implementation
//! for OpenSearch with vector field mappings for product embeddings.

pub mod errors;
pub mod interfaces;
pub mod opensearch;

pub use errors::SearchIndexError;
pub use interfaces::SearchIndexProvider;
pub use opensearch::{IndexConfig, OpenSearchProvider};
