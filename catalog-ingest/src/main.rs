//! Catalog Ingest Main Entry Point
//!
//! Runs the ingestion worker pool: product records from Kafka are embedded
//! and indexed into OpenSearch until the input ends or Ctrl-C.

use dotenv::dotenv;
use tracing::{error, info};

use catalog_ingest::telemetry::init_tracing;
use catalog_ingest::{Dependencies, IndexingError, IngestConfig};

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing("catalog-ingest");

    info!("Starting catalog ingest");

    let config = IngestConfig::from_env()?;
    let deps = match Dependencies::new(config).await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    let search_index = deps.search_index().await?;
    let pool = deps.worker_pool(search_index)?;

    let report = pool.run().await;

    info!(
        received = report.received,
        indexed = report.indexed,
        requeued = report.requeued,
        dropped_exhausted = report.dropped_exhausted,
        dropped_invalid = report.dropped_invalid,
        unrouted = report.unrouted,
        "Catalog ingest stopped"
    );

    for state in deps.registry.get_all_states().await {
        info!(
            breaker = %state.name,
            state = %state.state,
            trips = state.trips,
            rejected = state.rejected,
            "Final breaker state"
        );
    }

    Ok(())
}
