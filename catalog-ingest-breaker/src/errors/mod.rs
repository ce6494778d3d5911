//! Error types for breaker state stores.

use thiserror::Error;

/// Errors raised by a [`BreakerStateStore`](crate::BreakerStateStore).
///
/// Breakers never surface these to their callers. A failed load or save is
/// logged and the breaker keeps working from its in-process snapshot.
#[derive(Debug, Error)]
pub enum BreakerStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt breaker state for {name}: {reason}")]
    Corrupt { name: String, reason: String },
}

impl BreakerStoreError {
    pub fn corrupt(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
