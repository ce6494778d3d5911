//! # Catalog Ingest Breaker
//!
//! Circuit breakers for the external dependencies of the ingestion pipeline
//! (embedding service, search index, broker, cache).
//!
//! A breaker trips after a run of consecutive failures, fails fast while open,
//! and lets a limited number of probes through once its recovery timeout has
//! elapsed. Breaker state lives behind the [`BreakerStateStore`] trait so that
//! several processes can share it.
//!
//! ## Usage
//!
//! ```ignore
//! use catalog_ingest_breaker::{config, BreakerStoreSource};
//!
//! let registry = BreakerStoreSource::memory().into_registry().await?;
//! let breaker = registry.get_breaker(config::EMBEDDING);
//!
//! if breaker.allow_request().await {
//!     match call_dependency().await {
//!         Ok(_) => breaker.record_success().await,
//!         Err(_) => breaker.record_failure().await,
//!     }
//! }
//! ```

use std::sync::Arc;

pub mod breaker;
pub mod clock;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod postgres;
pub mod registry;
pub mod state;

pub use breaker::CircuitBreaker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BreakerConfig;
pub use errors::BreakerStoreError;
pub use interfaces::BreakerStateStore;
pub use memory::MemoryStateStore;
pub use postgres::PostgresStateStore;
pub use registry::CircuitBreakerRegistry;
pub use state::{BreakerSnapshot, CircuitState};

/// Which backend holds breaker state.
#[derive(Debug, Clone)]
pub enum BreakerStoreSource {
    /// Process-local state.
    Memory,

    /// State shared through PostgreSQL.
    Postgres {
        /// PostgreSQL connection URL
        database_url: String,
    },
}

impl BreakerStoreSource {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
        }
    }

    /// Create the state store for this source.
    pub async fn into_store(self) -> Result<Arc<dyn BreakerStateStore>, BreakerStoreError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryStateStore::new())),
            Self::Postgres { database_url } => {
                Ok(Arc::new(PostgresStateStore::connect(&database_url).await?))
            }
        }
    }

    /// Create a registry over this source's store, using the system clock and
    /// `BREAKER_<NAME>_*` environment overrides.
    pub async fn into_registry(self) -> Result<CircuitBreakerRegistry, BreakerStoreError> {
        let store = self.into_store().await?;
        Ok(CircuitBreakerRegistry::new(store, Arc::new(SystemClock)).with_env_overrides())
    }
}
