pub mod encoding;
pub mod highlights;
pub mod indexing;
pub mod moderation;
pub mod thumbnail;
pub mod transcription;

use tracing::debug;
use uuid::Uuid;

use super::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::models::job::{Claim, ProcessingJob, Stage};
use crate::models::video::VideoAsset;

/// Take the stage row, or `None` when this delivery is stale.
pub(crate) async fn claim(
    ctx: &PipelineContext,
    video_id: Uuid,
    stage: Stage,
) -> Result<Option<ProcessingJob>> {
    match ctx.ledger.claim_job(video_id, stage).await? {
        Claim::Claimed(job) => Ok(Some(job)),
        Claim::AlreadyTerminal(status) => {
            debug!(video_id = %video_id, stage = %stage, status = %status, "Stage already terminal, skipping delivery");
            Ok(None)
        }
    }
}

pub(crate) async fn load_video(ctx: &PipelineContext, video_id: Uuid) -> Result<VideoAsset> {
    ctx.ledger
        .get_video(video_id)
        .await?
        .ok_or_else(|| PipelineError::video_not_found(video_id))
}
