//! Retry Coordinator Entry Point
//!
//! Drains the failure topic on a fixed interval and resubmits records whose
//! backoff has elapsed to their original topic.

use dotenv::dotenv;
use tracing::{error, info};

use catalog_ingest::telemetry::init_tracing;
use catalog_ingest::{Dependencies, IndexingError, IngestConfig};

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    dotenv().ok();

    init_tracing("retry-coordinator");

    info!("Starting retry coordinator");

    let config = IngestConfig::from_env()?;
    let deps = match Dependencies::new(config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    let coordinator = deps.retry_coordinator()?;
    coordinator.run().await;

    info!("Retry coordinator stopped");
    Ok(())
}
