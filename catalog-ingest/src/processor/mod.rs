//! Processor module for the catalog ingestion pipeline.
//!
//! Turns product records into indexed documents and decides what happens to
//! the ones that could not be indexed.

mod failure_router;
mod record_processor;

pub use failure_router::{FailureRouter, RouteOutcome};
pub use record_processor::{IndexedRecord, RecordProcessor, DEFAULT_INDEX_TIMEOUT};
