//! PostgreSQL persistence for the pipeline ledger.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod queries;

pub use queries::PgLedger;

/// Connections held back for the API handlers on top of one per worker loop.
const API_CONNECTIONS: u32 = 8;

/// Open a pool sized for `worker_concurrency` pipeline loops. Every ledger
/// call is a single statement or a short transaction, so one connection per
/// loop is enough.
pub async fn init_pool(database_url: &str, worker_concurrency: usize) -> Result<PgPool, sqlx::Error> {
    let workers = u32::try_from(worker_concurrency.max(1)).unwrap_or(u32::MAX);
    let max = workers.saturating_add(API_CONNECTIONS);

    PgPoolOptions::new()
        .max_connections(max)
        .min_connections(2.min(max))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .test_before_acquire(true)
        .connect(database_url)
        .await
}

/// Apply the ledger schema under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::debug!("Applying pipeline ledger migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}
