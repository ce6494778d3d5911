//! PostgreSQL-backed breaker state, shared between processes.

mod state_store;

pub use state_store::PostgresStateStore;
