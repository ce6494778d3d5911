//! The circuit breaker guarding one dependency.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::BreakerConfig;
use crate::interfaces::BreakerStateStore;
use crate::state::{BreakerSnapshot, CircuitState, Transition};

/// Per-dependency failure tracker.
///
/// The breaker only advises: callers ask [`allow_request`](Self::allow_request)
/// before calling the dependency and report the outcome with
/// [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). None of these ever fail; if the
/// state store is unreachable the breaker carries on with its local snapshot.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    store: Arc<dyn BreakerStateStore>,
    clock: Arc<dyn Clock>,
    local: Mutex<BreakerSnapshot>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: BreakerConfig,
        store: Arc<dyn BreakerStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        let local = Mutex::new(BreakerSnapshot::new(name.clone(), clock.now()));
        Self {
            name,
            config,
            store,
            clock,
            local,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Whether a call to the dependency may be attempted now.
    ///
    /// Moves an open breaker to half-open once its recovery timeout has
    /// elapsed. Returns `false` without blocking while the breaker is open.
    pub async fn allow_request(&self) -> bool {
        let allowed = self
            .update(|snapshot, config, now| snapshot.try_acquire(config, now))
            .await;
        if !allowed {
            debug!(breaker = %self.name, "Request rejected by open breaker");
        }
        allowed
    }

    /// Report a successful call.
    pub async fn record_success(&self) {
        self.update(|snapshot, config, now| ((), snapshot.on_success(config, now)))
            .await
    }

    /// Report a failed call (error, timeout or unusable response).
    pub async fn record_failure(&self) {
        self.update(|snapshot, config, now| ((), snapshot.on_failure(config, now)))
            .await
    }

    /// Current snapshot, as last seen in the state store.
    pub async fn get_state(&self) -> BreakerSnapshot {
        let mut local = self.local.lock().await;
        self.refresh(&mut *local).await;
        local.clone()
    }

    /// Force the breaker closed.
    pub async fn reset(&self) {
        self.update(|snapshot, _, now| ((), snapshot.reset(now))).await;
        info!(breaker = %self.name, "Breaker reset");
    }

    /// Load, apply `f`, and save if anything changed.
    ///
    /// The local mutex serializes updates within this process.
    async fn update<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut BreakerSnapshot, &BreakerConfig, DateTime<Utc>) -> (T, Option<Transition>),
    {
        let mut local = self.local.lock().await;
        self.refresh(&mut *local).await;

        let before = local.clone();
        let (result, transition) = f(&mut *local, &self.config, self.clock.now());

        if let Some(transition) = transition {
            self.log_transition(transition, &*local);
        }
        if *local != before {
            if let Err(e) = self.store.save_state(&local).await {
                warn!(
                    breaker = %self.name,
                    error = %e,
                    "Failed to save breaker state, keeping local copy"
                );
            }
        }
        result
    }

    async fn refresh(&self, local: &mut BreakerSnapshot) {
        match self.store.load_state(&self.name).await {
            Ok(Some(stored)) => *local = stored,
            Ok(None) => {}
            Err(e) => {
                warn!(
                    breaker = %self.name,
                    error = %e,
                    "Failed to load breaker state, using local copy"
                );
            }
        }
    }

    fn log_transition(&self, transition: Transition, snapshot: &BreakerSnapshot) {
        match transition.to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                from = %transition.from,
                failure_count = snapshot.failure_count,
                reopen_count = snapshot.reopen_count,
                recovery_timeout_secs = snapshot.current_recovery_timeout(&self.config).as_secs(),
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                breaker = %self.name,
                "Circuit breaker half-open, probing dependency"
            ),
            CircuitState::Closed => info!(
                breaker = %self.name,
                from = %transition.from,
                "Circuit breaker closed"
            ),
        }
    }
}
