use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use video_pipeline::app_state;
use video_pipeline::config::AppConfig;
use video_pipeline::pipeline::runner;
use video_pipeline::pipeline::PipelineContext;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting video pipeline worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    let (_db_pool, ctx) = app_state::connect(&config)
        .await
        .expect("Failed to initialize pipeline dependencies");

    // Deliveries held by a previous worker that died mid-job.
    match ctx.queue.recover_in_flight().await {
        Ok(0) => {}
        Ok(recovered) => tracing::info!(recovered, "Recovered in-flight pipeline jobs"),
        Err(e) => tracing::error!(error = %e, "Failed to recover in-flight pipeline jobs"),
    }

    let shutdown = CancellationToken::new();
    let mut workers = JoinSet::new();
    for worker_id in 0..config.worker_concurrency.max(1) {
        workers.spawn(run_loop(
            worker_id,
            ctx.clone(),
            shutdown.clone(),
            poll_interval,
        ));
    }
    workers.spawn(report_queue_depth(ctx.clone(), shutdown.clone(), poll_interval));

    tracing::info!(
        concurrency = config.worker_concurrency,
        "Worker ready, processing pipeline jobs"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested, cancelling workers");
    shutdown.cancel();

    while workers.join_next().await.is_some() {}
    tracing::info!("Worker stopped");
}

/// Pull and dispatch jobs until cancelled. A cancelled handler leaves its
/// delivery in flight and its row InProgress; both are picked up again after
/// restart.
async fn run_loop(
    worker_id: usize,
    ctx: PipelineContext,
    shutdown: CancellationToken,
    poll_interval: Duration,
) {
    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = runner::process_next(&ctx) => result,
        };

        match result {
            Ok(Some(outcome)) => {
                tracing::debug!(worker_id, ?outcome, "Job processed, checking for next job");
            }
            Ok(None) => {
                tracing::trace!(worker_id, "No jobs available, sleeping");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Queue error, will retry");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
    tracing::debug!(worker_id, "Worker loop exited");
}

async fn report_queue_depth(
    ctx: PipelineContext,
    shutdown: CancellationToken,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match ctx.queue.queue_depth().await {
            Ok(depth) => metrics::gauge!("pipeline_queue_depth").set(depth as f64),
            Err(e) => tracing::warn!(error = %e, "Failed to read queue depth"),
        }
    }
}
