use async_trait::async_trait;

use crate::errors::BreakerStoreError;
use crate::state::BreakerSnapshot;

/// Where breaker snapshots live.
///
/// An in-process store is enough when a single process ingests. A shared store
/// lets several processes see the same breaker state; the read-check-update
/// race between processes is tolerated since breakers only advise callers.
#[async_trait]
pub trait BreakerStateStore: Send + Sync {
    /// Load the last saved snapshot for a breaker, if any.
    async fn load_state(&self, name: &str) -> Result<Option<BreakerSnapshot>, BreakerStoreError>;

    /// Save a breaker snapshot, replacing the previous one.
    async fn save_state(&self, snapshot: &BreakerSnapshot) -> Result<(), BreakerStoreError>;
}
