//! Named registry holding one breaker per dependency.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::config::{BreakerConfig, KNOWN_DEPENDENCIES};
use crate::interfaces::BreakerStateStore;
use crate::memory::MemoryStateStore;
use crate::state::BreakerSnapshot;

/// Registry of circuit breakers, keyed by dependency name.
///
/// The registry is constructed once at startup and passed to every component
/// that talks to a protected dependency. Exactly one [`CircuitBreaker`]
/// instance exists per name for the lifetime of the registry.
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    configs: HashMap<String, BreakerConfig>,
    store: Arc<dyn BreakerStateStore>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    pub fn new(store: Arc<dyn BreakerStateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            configs: HashMap::new(),
            store,
            clock,
        }
    }

    /// A registry backed by an in-process store and the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStateStore::new()), Arc::new(SystemClock))
    }

    /// Use `config` for `name` instead of its default.
    ///
    /// Only affects breakers created after this call.
    pub fn with_config(mut self, name: impl Into<String>, config: BreakerConfig) -> Self {
        self.configs.insert(name.into(), config);
        self
    }

    /// Apply `BREAKER_<NAME>_*` environment overrides for every known dependency.
    pub fn with_env_overrides(mut self) -> Self {
        for name in KNOWN_DEPENDENCIES {
            self.configs
                .insert(name.to_string(), BreakerConfig::from_env(name));
        }
        self
    }

    /// Return the breaker for `name`, creating it on first use.
    pub fn get_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self
            .breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self
                    .configs
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| BreakerConfig::for_dependency(name));
                info!(
                    breaker = %name,
                    failure_threshold = config.failure_threshold,
                    recovery_timeout_secs = config.recovery_timeout.as_secs(),
                    "Created circuit breaker"
                );
                Arc::new(CircuitBreaker::new(
                    name,
                    config,
                    self.store.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Snapshots of every breaker created so far, sorted by name.
    pub async fn get_all_states(&self) -> Vec<BreakerSnapshot> {
        let mut states = Vec::new();
        for breaker in self.breakers() {
            states.push(breaker.get_state().await);
        }
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    /// Force one breaker closed.
    pub async fn reset(&self, name: &str) {
        self.get_breaker(name).reset().await;
    }

    /// Force every breaker closed.
    pub async fn reset_all(&self) {
        for breaker in self.breakers() {
            breaker.reset().await;
        }
    }

    fn breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{BROKER, EMBEDDING, SEARCH_INDEX};
    use crate::state::CircuitState;
    use std::time::Duration;

    #[test]
    fn test_same_name_returns_same_instance() {
        let registry = CircuitBreakerRegistry::in_memory();

        let a = registry.get_breaker(EMBEDDING);
        let b = registry.get_breaker(EMBEDDING);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &registry.get_breaker(SEARCH_INDEX)));
    }

    #[test]
    fn test_defaults_by_name() {
        let registry = CircuitBreakerRegistry::in_memory();

        assert_eq!(registry.get_breaker(BROKER).config().failure_threshold, 5);
        assert_eq!(
            registry.get_breaker("unknown").config(),
            &BreakerConfig::generic()
        );
    }

    #[test]
    fn test_config_override() {
        let custom = BreakerConfig::generic().with_failure_threshold(1);
        let registry = CircuitBreakerRegistry::in_memory().with_config(EMBEDDING, custom.clone());

        assert_eq!(registry.get_breaker(EMBEDDING).config(), &custom);
    }

    #[tokio::test]
    async fn test_breakers_are_isolated() {
        let registry = CircuitBreakerRegistry::in_memory();
        let embedding = registry.get_breaker(EMBEDDING);
        let index = registry.get_breaker(SEARCH_INDEX);

        for _ in 0..3 {
            embedding.record_failure().await;
        }

        assert!(!embedding.allow_request().await);
        assert!(index.allow_request().await);
    }

    #[tokio::test]
    async fn test_get_all_states_and_reset_all() {
        let clock = Arc::new(ManualClock::default());
        let registry = CircuitBreakerRegistry::new(Arc::new(MemoryStateStore::new()), clock);
        let embedding = registry.get_breaker(EMBEDDING);
        registry.get_breaker(BROKER);
        for _ in 0..3 {
            embedding.record_failure().await;
        }

        let states = registry.get_all_states().await;
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].name, BROKER);
        assert_eq!(states[0].state, CircuitState::Closed);
        assert_eq!(states[1].name, EMBEDDING);
        assert_eq!(states[1].state, CircuitState::Open);

        registry.reset_all().await;
        assert!(registry
            .get_all_states()
            .await
            .iter()
            .all(|s| s.state == CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_reset_single_breaker() {
        let registry = CircuitBreakerRegistry::in_memory()
            .with_config(SEARCH_INDEX, BreakerConfig::generic().with_failure_threshold(1));
        let index = registry.get_breaker(SEARCH_INDEX);
        index.record_failure().await;
        assert!(!index.allow_request().await);

        registry.reset(SEARCH_INDEX).await;

        assert!(index.allow_request().await);
        assert_eq!(
            index.config().recovery_timeout,
            Duration::from_secs(30)
        );
    }
}
