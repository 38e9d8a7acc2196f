//! Idempotent prerequisite checks. Each gate may be invoked any number of
//! times, concurrently, by the stages it depends on. Seeing an unfinished
//! prerequisite is a no-op; a later invocation will fire.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{PipelineContext, PipelineJob};
use crate::error::Result;
use crate::models::job::{JobStatus, Stage};
use crate::models::variant::{Variant, VariantStatus};
use crate::models::video::VideoStatus;

/// Fire ContentModeration once Transcription and ThumbnailGeneration are both
/// terminal and moderation is still Pending.
pub async fn moderation_gate(ctx: &PipelineContext, video_id: Uuid) -> Result<()> {
    if !moderation_prerequisites_met(ctx, video_id).await? {
        debug!(video_id = %video_id, "Moderation gate: prerequisites not terminal yet");
        return Ok(());
    }

    let Some(moderation) = ctx.ledger.get_job(video_id, Stage::ContentModeration).await? else {
        return Ok(());
    };
    if moderation.status != JobStatus::Pending {
        return Ok(());
    }

    let Some(video) = ctx.ledger.get_video(video_id).await? else {
        return Ok(());
    };

    if video.status == VideoStatus::Failed {
        let pending = [JobStatus::Pending];
        ctx.ledger
            .skip_job(video_id, Stage::ContentModeration, &pending)
            .await?;
        ctx.ledger
            .skip_job(video_id, Stage::SearchIndexing, &pending)
            .await?;
        ctx.ledger
            .skip_job(video_id, Stage::AiHighlights, &pending)
            .await?;
        info!(
            video_id = %video_id,
            "Moderation gate: video failed upstream, downstream stages skipped"
        );
        return Ok(());
    }

    ctx.queue
        .enqueue(&PipelineJob::ContentModeration { video_id })
        .await?;
    info!(video_id = %video_id, "Moderation gate: content moderation enqueued");
    Ok(())
}

/// Both moderation inputs reached a terminal state.
pub async fn moderation_prerequisites_met(ctx: &PipelineContext, video_id: Uuid) -> Result<bool> {
    for stage in [Stage::Transcription, Stage::ThumbnailGeneration] {
        match ctx.ledger.get_job(video_id, stage).await? {
            Some(job) if job.status.is_terminal() => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Arm AiHighlights when there is transcript text to work on, otherwise mark
/// it Skipped. Returns whether a highlights job was enqueued.
pub async fn highlights_gate(
    ctx: &PipelineContext,
    video_id: Uuid,
    segment_count: usize,
) -> Result<bool> {
    let rearmable = [
        JobStatus::Pending,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Skipped,
    ];

    if segment_count == 0 {
        let skipped = ctx
            .ledger
            .skip_job(video_id, Stage::AiHighlights, &rearmable)
            .await?;
        if skipped {
            info!(video_id = %video_id, "Highlights gate: empty transcript, highlights skipped");
        }
        return Ok(false);
    }

    if !ctx
        .ledger
        .rearm_job(video_id, Stage::AiHighlights, &rearmable)
        .await?
    {
        debug!(video_id = %video_id, "Highlights gate: highlights already running");
        return Ok(false);
    }

    ctx.queue
        .enqueue(&PipelineJob::AiHighlights { video_id })
        .await?;
    info!(video_id = %video_id, segment_count, "Highlights gate: AI highlights enqueued");
    Ok(true)
}

/// Fan-in over the encoding variants: once every variant is terminal and at
/// least one completed, write the master playlist. Safe to run redundantly;
/// the manifest write overwrites. With `master_playlist_claim` set, a ledger
/// claim makes the generation once-only.
pub async fn master_playlist_gate(ctx: &PipelineContext, video_id: Uuid) -> Result<()> {
    let variants = ctx.ledger.list_variants(video_id).await?;
    if variants.is_empty() || variants.iter().any(|v| !v.status.is_terminal()) {
        debug!(video_id = %video_id, "Master playlist gate: variants still encoding");
        return Ok(());
    }

    let mut completed: Vec<Variant> = variants
        .into_iter()
        .filter(|v| v.status == VariantStatus::Completed)
        .collect();
    if completed.is_empty() {
        warn!(video_id = %video_id, "Master playlist gate: every variant failed");
        return Ok(());
    }
    completed.sort_by(|a, b| b.bitrate_kbps.cmp(&a.bitrate_kbps));

    if ctx.config.master_playlist_claim && !ctx.ledger.claim_master_playlist(video_id).await? {
        debug!(video_id = %video_id, "Master playlist gate: already claimed");
        return Ok(());
    }

    match ctx
        .encoder
        .generate_master_playlist(video_id, &completed)
        .await
    {
        Ok(path) => {
            ctx.ledger
                .set_master_playlist_path(video_id, Some(&path))
                .await?;
            metrics::counter!("pipeline_master_playlists_total").increment(1);
            info!(
                video_id = %video_id,
                path = %path,
                variants = completed.len(),
                "Master playlist generated"
            );
        }
        Err(e) => {
            error!(video_id = %video_id, error = %e, "Master playlist generation failed");
        }
    }
    Ok(())
}
