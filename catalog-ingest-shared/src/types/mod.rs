//! Core data structures used across the ingestion pipeline.

pub mod embedding;
pub mod failure_envelope;
pub mod product_document;
pub mod product_record;
