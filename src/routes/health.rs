use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub queue: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn from_probe<E>(result: Result<(), E>, started: Instant) -> Self {
        match result {
            Ok(()) => Self {
                status: "ok",
                latency_ms: Some(started.elapsed().as_millis() as u64),
            },
            Err(_) => Self {
                status: "error",
                latency_ms: None,
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.status != "error"
    }
}

/// GET /health: dependency status of the database and the job queue.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_start = Instant::now();
    let database = match &state.db {
        Some(pool) => ComponentHealth::from_probe(
            sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            db_start,
        ),
        None => ComponentHealth {
            status: "not_configured",
            latency_ms: None,
        },
    };

    let queue_start = Instant::now();
    let queue =
        ComponentHealth::from_probe(state.pipeline.queue.health_check().await, queue_start);

    let all_healthy = database.is_healthy() && queue.is_healthy();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks { database, queue },
    };

    (status_code, Json(response))
}
