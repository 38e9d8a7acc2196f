use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// Prometheus scrape endpoint in text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every pipeline metric.
pub fn describe_pipeline_metrics() {
    metrics::describe_histogram!(
        "pipeline_stage_duration_seconds",
        "Time spent handling one pipeline job, by stage"
    );
    metrics::describe_counter!(
        "pipeline_stage_completed_total",
        "Pipeline stages that completed, by stage"
    );
    metrics::describe_counter!(
        "pipeline_stage_failed_total",
        "Pipeline stages that failed terminally, by stage"
    );
    metrics::describe_counter!(
        "pipeline_stage_retried_total",
        "Pipeline stage attempts scheduled for retry, by stage"
    );
    metrics::describe_counter!(
        "pipeline_videos_ingested_total",
        "Videos whose pipeline graph was created"
    );
    metrics::describe_counter!(
        "pipeline_master_playlists_total",
        "Master playlists written"
    );
    metrics::describe_gauge!(
        "pipeline_queue_depth",
        "Pipeline jobs waiting in the ready queue"
    );
}
