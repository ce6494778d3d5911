//! PostgreSQL implementation of the breaker state store.
//!
//! Stores one row per breaker in the `circuit_breaker_state` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::errors::BreakerStoreError;
use crate::interfaces::BreakerStateStore;
use crate::state::{BreakerSnapshot, CircuitState};

/// PostgreSQL-backed breaker state store.
pub struct PostgresStateStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct StateRow {
    name: String,
    state: String,
    failure_count: i32,
    half_open_successes: i32,
    probes_in_flight: i32,
    reopen_count: i32,
    trips: i64,
    resets: i64,
    rejected: i64,
    last_failure_at: Option<DateTime<Utc>>,
    last_state_change_at: DateTime<Utc>,
    last_slot_granted_at: Option<DateTime<Utc>>,
}

impl TryFrom<StateRow> for BreakerSnapshot {
    type Error = BreakerStoreError;

    fn try_from(row: StateRow) -> Result<Self, Self::Error> {
        let state = CircuitState::parse(&row.state)
            .ok_or_else(|| BreakerStoreError::corrupt(&row.name, format!("state {}", row.state)))?;
        let count = |field: &str, value: i32| {
            u32::try_from(value)
                .map_err(|_| BreakerStoreError::corrupt(&row.name, format!("{} = {}", field, value)))
        };
        let total = |field: &str, value: i64| {
            u64::try_from(value)
                .map_err(|_| BreakerStoreError::corrupt(&row.name, format!("{} = {}", field, value)))
        };

        Ok(BreakerSnapshot {
            state,
            failure_count: count("failure_count", row.failure_count)?,
            half_open_successes: count("half_open_successes", row.half_open_successes)?,
            probes_in_flight: count("probes_in_flight", row.probes_in_flight)?,
            reopen_count: count("reopen_count", row.reopen_count)?,
            trips: total("trips", row.trips)?,
            resets: total("resets", row.resets)?,
            rejected: total("rejected", row.rejected)?,
            last_failure_at: row.last_failure_at,
            last_state_change_at: row.last_state_change_at,
            last_slot_granted_at: row.last_slot_granted_at,
            name: row.name,
        })
    }
}

impl PostgresStateStore {
    /// Connect to the database and apply the breaker state migrations.
    pub async fn connect(database_url: &str) -> Result<Self, BreakerStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("src/postgres/migrations").run(&pool).await?;
        info!("Connected breaker state store to PostgreSQL");

        Ok(Self { pool })
    }

    /// Use an existing pool whose schema is already migrated.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl BreakerStateStore for PostgresStateStore {
    async fn load_state(&self, name: &str) -> Result<Option<BreakerSnapshot>, BreakerStoreError> {
        let row: Option<StateRow> = sqlx::query_as(
            "SELECT name, state, failure_count, half_open_successes, probes_in_flight, \
             reopen_count, trips, resets, rejected, last_failure_at, last_state_change_at, \
             last_slot_granted_at FROM circuit_breaker_state WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BreakerSnapshot::try_from).transpose()
    }

    async fn save_state(&self, snapshot: &BreakerSnapshot) -> Result<(), BreakerStoreError> {
        sqlx::query(
            "INSERT INTO circuit_breaker_state (name, state, failure_count, half_open_successes, \
             probes_in_flight, reopen_count, trips, resets, rejected, last_failure_at, \
             last_state_change_at, last_slot_granted_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW()) \
             ON CONFLICT (name) DO UPDATE SET state = $2, failure_count = $3, \
             half_open_successes = $4, probes_in_flight = $5, reopen_count = $6, trips = $7, \
             resets = $8, rejected = $9, last_failure_at = $10, last_state_change_at = $11, \
             last_slot_granted_at = $12, updated_at = NOW()",
        )
        .bind(&snapshot.name)
        .bind(snapshot.state.as_str())
        .bind(to_i32(snapshot.failure_count))
        .bind(to_i32(snapshot.half_open_successes))
        .bind(to_i32(snapshot.probes_in_flight))
        .bind(to_i32(snapshot.reopen_count))
        .bind(to_i64(snapshot.trips))
        .bind(to_i64(snapshot.resets))
        .bind(to_i64(snapshot.rejected))
        .bind(snapshot.last_failure_at)
        .bind(snapshot.last_state_change_at)
        .bind(snapshot.last_slot_granted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
