//! Record-level retries.
//!
//! Failed records sit in the failure log as [`FailureEnvelope`]s until the
//! [`RetryCoordinator`] finds them due and resubmits them to the topic they
//! came from.
//!
//! [`FailureEnvelope`]: catalog_ingest_shared::FailureEnvelope

mod coordinator;
mod policy;

pub use coordinator::{
    PassReport, RetryCoordinator, RetryDecision, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_PER_PASS,
    DEFAULT_POLL_INTERVAL,
};
pub use policy::{RetryPolicy, DEFAULT_BASE_BACKOFF, DEFAULT_JITTER_RATIO, DEFAULT_MAX_BACKOFF};
