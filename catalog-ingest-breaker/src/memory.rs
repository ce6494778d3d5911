//! In-process breaker state store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::BreakerStoreError;
use crate::interfaces::BreakerStateStore;
use crate::state::BreakerSnapshot;

/// Keeps snapshots in a map. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, BreakerSnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BreakerStateStore for MemoryStateStore {
    async fn load_state(&self, name: &str) -> Result<Option<BreakerSnapshot>, BreakerStoreError> {
        Ok(self.states.read().await.get(name).cloned())
    }

    async fn save_state(&self, snapshot: &BreakerSnapshot) -> Result<(), BreakerStoreError> {
        self.states
            .write()
            .await
            .insert(snapshot.name.clone(), snapshot.clone());
        Ok(())
    }
}
