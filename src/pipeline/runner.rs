//! One delivery at a time: dequeue, dispatch, acknowledge.

use std::time::Duration;

use tracing::{debug, error, warn};

use super::{dispatch, PipelineContext};
use crate::error::PipelineError;
use crate::ledger::LedgerError;
use crate::services::queue::{QueueError, QueuedJob};

/// Delay before redelivering a job whose handler hit an infrastructure error.
pub const INFRASTRUCTURE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    /// Dropped without retry: the target no longer exists or the payload is
    /// inconsistent with the ledger.
    Dropped,
    /// Put back on the queue after [`INFRASTRUCTURE_RETRY_DELAY`].
    Redelivered,
}

/// Process the next ready job. Returns `None` when the queue is empty.
pub async fn process_next(ctx: &PipelineContext) -> Result<Option<Outcome>, QueueError> {
    let Some(delivery) = ctx.queue.dequeue().await? else {
        return Ok(None);
    };
    process_delivery(ctx, &delivery).await.map(Some)
}

/// Dispatch a dequeued job and acknowledge it according to the result.
/// Stage failures are already recorded on their rows by the handler, so only
/// handler errors reach this point.
pub async fn process_delivery(
    ctx: &PipelineContext,
    delivery: &QueuedJob,
) -> Result<Outcome, QueueError> {
    let job = &delivery.job;
    debug!(
        video_id = %job.video_id(),
        job = job.kind(),
        delivery_id = %delivery.delivery_id,
        "Dispatching pipeline job"
    );

    let outcome = match dispatch(ctx, job).await {
        Ok(()) => Outcome::Handled,
        Err(
            e @ (PipelineError::NotFound { .. }
            | PipelineError::Validation(_)
            | PipelineError::Ledger(LedgerError::NotFound { .. })),
        ) => {
            warn!(video_id = %job.video_id(), job = job.kind(), error = %e, "Dropping pipeline job");
            Outcome::Dropped
        }
        Err(e) => {
            error!(
                video_id = %job.video_id(),
                job = job.kind(),
                error = %e,
                "Pipeline job hit an infrastructure error, redelivering"
            );
            ctx.queue
                .enqueue_delayed(job, INFRASTRUCTURE_RETRY_DELAY)
                .await?;
            Outcome::Redelivered
        }
    };

    ctx.queue.complete(delivery).await?;
    Ok(outcome)
}
