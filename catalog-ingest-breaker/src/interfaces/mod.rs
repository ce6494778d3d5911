//! Storage seam for breaker state.

mod state_store;

pub use state_store::BreakerStateStore;
