//! Breakers in separate registries that share one state store behave like
//! breakers in separate processes pointed at the same database.

use std::sync::Arc;
use std::time::Duration;

use catalog_ingest_breaker::{
    config::EMBEDDING, BreakerConfig, BreakerStateStore, CircuitBreakerRegistry, CircuitState,
    ManualClock, MemoryStateStore,
};

fn registry(store: Arc<dyn BreakerStateStore>, clock: Arc<ManualClock>) -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::new(store, clock).with_config(
        EMBEDDING,
        BreakerConfig::for_dependency(EMBEDDING).with_recovery_timeout(Duration::from_secs(10)),
    )
}

#[tokio::test]
async fn test_trip_is_visible_to_other_registry() {
    let store: Arc<dyn BreakerStateStore> = Arc::new(MemoryStateStore::new());
    let clock = Arc::new(ManualClock::default());
    let worker_a = registry(store.clone(), clock.clone());
    let worker_b = registry(store.clone(), clock.clone());

    let breaker_a = worker_a.get_breaker(EMBEDDING);
    for _ in 0..3 {
        breaker_a.record_failure().await;
    }

    let breaker_b = worker_b.get_breaker(EMBEDDING);
    assert!(!breaker_b.allow_request().await);
    assert_eq!(breaker_b.get_state().await.state, CircuitState::Open);
}

#[tokio::test]
async fn test_failures_accumulate_across_registries() {
    let store: Arc<dyn BreakerStateStore> = Arc::new(MemoryStateStore::new());
    let clock = Arc::new(ManualClock::default());
    let worker_a = registry(store.clone(), clock.clone());
    let worker_b = registry(store.clone(), clock.clone());

    worker_a.get_breaker(EMBEDDING).record_failure().await;
    worker_b.get_breaker(EMBEDDING).record_failure().await;
    worker_a.get_breaker(EMBEDDING).record_failure().await;

    let state = store.load_state(EMBEDDING).await.unwrap().unwrap();
    assert_eq!(state.state, CircuitState::Open);
    assert_eq!(state.failure_count, 3);
}

#[tokio::test]
async fn test_operator_reset_reaches_other_registry() {
    let store: Arc<dyn BreakerStateStore> = Arc::new(MemoryStateStore::new());
    let clock = Arc::new(ManualClock::default());
    let worker = registry(store.clone(), clock.clone());
    let operator = registry(store.clone(), clock.clone());

    for _ in 0..3 {
        worker.get_breaker(EMBEDDING).record_failure().await;
    }
    operator.reset(EMBEDDING).await;

    assert!(worker.get_breaker(EMBEDDING).allow_request().await);
}

#[tokio::test]
async fn test_probe_slots_are_shared() {
    let store: Arc<dyn BreakerStateStore> = Arc::new(MemoryStateStore::new());
    let clock = Arc::new(ManualClock::default());
    let worker_a = registry(store.clone(), clock.clone());
    let worker_b = registry(store.clone(), clock.clone());

    for _ in 0..3 {
        worker_a.get_breaker(EMBEDDING).record_failure().await;
    }
    clock.advance(Duration::from_secs(10));

    // half_open_success_threshold is 2 for the embedding breaker
    assert!(worker_a.get_breaker(EMBEDDING).allow_request().await);
    assert!(worker_b.get_breaker(EMBEDDING).allow_request().await);
    assert!(!worker_b.get_breaker(EMBEDDING).allow_request().await);
}
