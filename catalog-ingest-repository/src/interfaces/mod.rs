//! Interface definitions for the search index provider.
//!
//! The `SearchIndexProvider` trait allows the pipeline to run against
//! OpenSearch in production and against in-memory mocks in tests.

mod search_index_provider;

pub use search_index_provider::SearchIndexProvider;
