pub mod error;
pub mod health;
pub mod metrics;
pub mod videos;

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

/// API routes for the pipeline operations plus health.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/videos", post(videos::create_video))
        .route(
            "/api/v1/videos/{video_id}/processing",
            get(videos::get_processing_status),
        )
        .route(
            "/api/v1/videos/{video_id}/reprocess",
            post(videos::reprocess_video),
        )
        .route(
            "/api/v1/videos/{video_id}/regenerate-ai",
            post(videos::regenerate_ai),
        )
        .route(
            "/api/v1/videos/{video_id}/review",
            post(videos::review_video),
        )
        .with_state(state)
}
