use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{AppConfig, ConfigError};
use crate::db::{self, PgLedger};
use crate::error::ExternalError;
use crate::pipeline::PipelineContext;
use crate::services::encoder::HttpEncoderClient;
use crate::services::queue::{QueueError, RedisJobQueue};
use crate::services::search::HttpSearchIndex;
use crate::services::storage::{ContentStore, R2Client, StorageError};
use crate::services::workers_ai::WorkersAiClient;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Option<PgPool>,
    pub pipeline: PipelineContext,
}

impl AppState {
    pub fn new(db: PgPool, pipeline: PipelineContext) -> Self {
        Self {
            db: Some(db),
            pipeline,
        }
    }

    /// State without a database pool, backed by whatever ledger the context
    /// carries. Health reports the database as not configured.
    pub fn without_database(pipeline: PipelineContext) -> Self {
        Self { db: None, pipeline }
    }
}

/// Start-up failure of either binary.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage client error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue client error: {0}")]
    Queue(#[from] QueueError),

    #[error("Collaborator client error: {0}")]
    External(#[from] ExternalError),
}

/// Connect to PostgreSQL, R2, Redis and the collaborator services and wire
/// them into a pipeline context. Migrations are the caller's concern.
pub async fn connect(config: &AppConfig) -> Result<(PgPool, PipelineContext), StartupError> {
    let pipeline_config = config.pipeline()?;

    tracing::info!("Connecting to PostgreSQL database");
    let pool = db::init_pool(&config.database_url, config.worker_concurrency).await?;

    tracing::info!("Initializing R2 storage client");
    let store: Arc<dyn ContentStore> = Arc::new(R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )?);

    tracing::info!("Connecting to Redis job queue");
    let queue = RedisJobQueue::new(&config.redis_url)?;

    tracing::info!("Initializing Workers AI, encoder and search clients");
    let workers_ai = Arc::new(WorkersAiClient::new(
        &config.cf_account_id,
        &config.cf_api_token,
        store.clone(),
    )?);
    let encoder = Arc::new(HttpEncoderClient::new(&config.encoder_url, store.clone())?);
    let search = HttpSearchIndex::new(&config.search_url, config.search_api_key.clone())?;

    let ctx = PipelineContext {
        ledger: Arc::new(PgLedger::new(pool.clone())),
        queue: Arc::new(queue),
        store,
        transcriber: workers_ai.clone(),
        classifier: workers_ai.clone(),
        encoder: encoder.clone(),
        thumbnails: encoder,
        highlights: workers_ai,
        search: Arc::new(search),
        config: Arc::new(pipeline_config),
    };

    Ok((pool, ctx))
}
