//! Worker pool pulling records from the input log.
//!
//! A fixed number of workers share one consumer. Each worker takes one
//! record at a time, runs it through the [`RecordProcessor`], routes
//! failures, and acknowledges the message once it has been settled. The
//! circuit breaker registry is the only state workers share.

mod metrics;
mod worker;

pub use metrics::{PipelineMetrics, PoolReport};

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, instrument};

use catalog_ingest_breaker::CircuitBreakerRegistry;

use crate::processor::{FailureRouter, RecordProcessor};
use crate::queue::LogConsumer;
use worker::Worker;

/// Default number of concurrent workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    /// How often progress and breaker states are logged.
    pub progress_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Pool of ingestion workers.
pub struct IngestionWorkerPool {
    worker: Arc<Worker>,
    registry: Arc<CircuitBreakerRegistry>,
    config: PoolConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl IngestionWorkerPool {
    pub fn new(
        consumer: Arc<dyn LogConsumer>,
        processor: Arc<RecordProcessor>,
        router: Arc<FailureRouter>,
        registry: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self::with_config(consumer, processor, router, registry, PoolConfig::default())
    }

    pub fn with_config(
        consumer: Arc<dyn LogConsumer>,
        processor: Arc<RecordProcessor>,
        router: Arc<FailureRouter>,
        registry: Arc<CircuitBreakerRegistry>,
        config: PoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            worker: Arc::new(Worker {
                consumer,
                processor,
                router,
                metrics: PipelineMetrics::default(),
            }),
            registry,
            config,
            shutdown_tx,
        }
    }

    /// Counters so far.
    pub fn metrics(&self) -> PoolReport {
        self.worker.metrics.snapshot()
    }

    /// Run the workers until the input log ends, Ctrl-C, or
    /// [`shutdown`](Self::shutdown). In-flight records are finished first.
    #[instrument(skip(self), fields(worker_count = self.config.worker_count))]
    pub async fn run(&self) -> PoolReport {
        let worker_count = self.config.worker_count.max(1);
        info!(worker_count, "Starting ingestion worker pool");

        let handles: Vec<_> = (0..worker_count)
            .map(|id| {
                let worker = Arc::clone(&self.worker);
                let shutdown = self.shutdown_tx.subscribe();
                tokio::spawn(async move { worker.run(id, shutdown).await })
            })
            .collect();
        let workers = join_all(handles);
        tokio::pin!(workers);

        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the first tick immediately
        progress_timer.tick().await;

        let mut prev = self.metrics();
        let mut prev_time = Instant::now();
        let mut stopping = false;

        loop {
            tokio::select! {
                results = &mut workers => {
                    for result in results {
                        if let Err(e) = result {
                            error!(error = %e, "Worker task failed");
                        }
                    }
                    break;
                }
                _ = tokio::signal::ctrl_c(), if !stopping => {
                    info!("Received shutdown signal, finishing in-flight records");
                    stopping = true;
                    self.shutdown();
                }
                _ = progress_timer.tick() => {
                    let current = self.metrics();
                    let now = Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let records_per_sec = if elapsed_secs > 0.0 {
                        (current.received.saturating_sub(prev.received) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    info!(
                        received = current.received,
                        indexed = current.indexed,
                        requeued = current.requeued,
                        dropped_invalid = current.dropped_invalid,
                        dropped_exhausted = current.dropped_exhausted,
                        fallback_text = current.fallback_text,
                        fallback_image = current.fallback_image,
                        records_per_sec = format!("{:.2}", records_per_sec),
                        breakers = %self.breaker_summary().await,
                        "Processing progress"
                    );

                    prev = current;
                    prev_time = now;
                }
            }
        }

        let report = self.metrics();
        info!(
            received = report.received,
            indexed = report.indexed,
            requeued = report.requeued,
            dropped_invalid = report.dropped_invalid,
            dropped_exhausted = report.dropped_exhausted,
            unrouted = report.unrouted,
            "Worker pool shutdown complete"
        );
        report
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// `name=STATE` pairs for every breaker, e.g. `embedding=OPEN,search_index=CLOSED`.
    async fn breaker_summary(&self) -> String {
        self.registry
            .get_all_states()
            .await
            .iter()
            .map(|snapshot| format!("{}={}", snapshot.name, snapshot.state))
            .collect::<Vec<_>>()
            .join(",")
    }
}
