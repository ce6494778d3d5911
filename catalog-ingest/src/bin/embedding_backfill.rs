//! Embedding Backfill Entry Point
//!
//! One-shot job: replaces fallback embeddings in the index with real ones.
//! Meant to be run after an embedding service outage, e.g. from a cron job.

use dotenv::dotenv;
use tracing::{error, info};

use catalog_ingest::telemetry::init_tracing;
use catalog_ingest::{Dependencies, IndexingError, IngestConfig};

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    dotenv().ok();

    init_tracing("embedding-backfill");

    info!("Starting embedding backfill");

    let config = IngestConfig::from_env()?;
    let deps = Dependencies::new(config).await?;
    let search_index = deps.search_index().await?;

    match deps.backfill(search_index).run().await {
        Ok(report) => {
            info!(
                scanned = report.scanned,
                text_replaced = report.text_replaced,
                image_replaced = report.image_replaced,
                skipped = report.skipped,
                failed = report.failed,
                "Embedding backfill completed"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Embedding backfill failed");
            Err(e.into())
        }
    }
}
