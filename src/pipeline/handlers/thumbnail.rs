use tracing::{info, warn};
use uuid::Uuid;

use super::{claim, load_video};
use crate::error::{ExternalError, Result};
use crate::models::job::Stage;
use crate::pipeline::{gates, record_completed, record_failed, PipelineContext};

/// Extract a frame, check it really is an image and store it. Failure is
/// recorded on the stage only; the rest of the pipeline carries on.
pub async fn run(ctx: &PipelineContext, video_id: Uuid) -> Result<()> {
    let Some(_job) = claim(ctx, video_id, Stage::ThumbnailGeneration).await? else {
        return Ok(());
    };
    let video = load_video(ctx, video_id).await?;

    match generate(ctx, video_id, &video.media_ref).await {
        Ok(path) => {
            ctx.ledger.set_thumbnail_path(video_id, &path).await?;
            ctx.ledger
                .complete_job(video_id, Stage::ThumbnailGeneration)
                .await?;
            record_completed("thumbnail_generation");
            info!(video_id = %video_id, path = %path, "Thumbnail stored");
        }
        Err(e) => {
            ctx.ledger
                .fail_job(video_id, Stage::ThumbnailGeneration, &e.to_string())
                .await?;
            record_failed("thumbnail_generation");
            warn!(video_id = %video_id, error = %e, "Thumbnail generation failed");
        }
    }

    gates::moderation_gate(ctx, video_id).await
}

async fn generate(
    ctx: &PipelineContext,
    video_id: Uuid,
    media_ref: &str,
) -> Result<String, ExternalError> {
    let frame = ctx.thumbnails.extract_frame(media_ref).await?;

    let format = image::guess_format(&frame).map_err(|e| {
        ExternalError::service("thumbnail", format!("extracted frame is not an image: {e}"))
    })?;
    let extension = format.extensions_str().first().copied().unwrap_or("img");

    let key = format!("videos/{video_id}/thumbnail.{extension}");
    ctx.store.put(&key, &frame, format.to_mime_type()).await?;
    Ok(key)
}
