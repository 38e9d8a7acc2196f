//! Operations exposed to callers: intake, reprocess, AI regeneration and
//! reviewer decisions.

use tracing::{info, warn};
use uuid::Uuid;

use super::{gates, PipelineContext, PipelineJob};
use crate::error::{PipelineError, Result};
use crate::models::job::{JobStatus, ProcessingJob, Stage};
use crate::models::moderation::ReviewDecision;
use crate::models::variant::{Variant, VariantStatus};
use crate::models::video::VideoStatus;

/// Build the job/variant graph for a video and fan out the stages that have
/// no prerequisites. Moderation, indexing and highlights stay Pending until a
/// gate arms them.
///
/// Returns false when the video already had a graph. A repeated intake still
/// fills in missing variants and re-enqueues every root job that is Pending,
/// so an intake that failed halfway is finished by its redelivery. Extra
/// deliveries are absorbed by the handlers' claims.
pub async fn enqueue_ingest(
    ctx: &PipelineContext,
    video_id: Uuid,
    media_ref: &str,
    language_hint: Option<&str>,
) -> Result<bool> {
    if ctx.ledger.get_video(video_id).await?.is_none() {
        return Err(PipelineError::video_not_found(video_id));
    }

    // No malware scanner is wired in, so that stage is born terminal.
    let jobs: Vec<ProcessingJob> = Stage::ALL
        .iter()
        .map(|&stage| {
            let status = if stage == Stage::MalwareScan {
                JobStatus::Skipped
            } else {
                JobStatus::Pending
            };
            ProcessingJob::new(video_id, stage, status)
        })
        .collect();

    let created = ctx.ledger.create_jobs(&jobs).await?;
    if !created {
        info!(video_id = %video_id, "Video already ingested, re-driving pending fan-out");
    }
    ctx.ledger
        .set_media_source(video_id, media_ref, language_hint)
        .await?;
    ctx.ledger
        .transition_video_status(video_id, VideoStatus::Queued, &AFTER_INTAKE)
        .await?;

    let variants = ensure_variants(ctx, video_id).await?;
    let enqueued = fan_out(ctx, video_id, &variants).await?;

    if created {
        metrics::counter!("pipeline_videos_ingested_total").increment(1);
        info!(
            video_id = %video_id,
            variants = variants.len(),
            "Video ingested, pipeline fanned out"
        );
    } else if enqueued > 0 {
        warn!(video_id = %video_id, enqueued, "Re-enqueued pending jobs of an earlier intake");
    }
    Ok(created)
}

/// Every status a video can reach once intake has queued it.
const AFTER_INTAKE: [VideoStatus; 7] = [
    VideoStatus::Queued,
    VideoStatus::Indexing,
    VideoStatus::Moderating,
    VideoStatus::Quarantined,
    VideoStatus::Rejected,
    VideoStatus::Published,
    VideoStatus::Failed,
];

/// Create the variants the configured ladder is missing and return the full
/// set as stored.
async fn ensure_variants(ctx: &PipelineContext, video_id: Uuid) -> Result<Vec<Variant>> {
    let existing = ctx.ledger.list_variants(video_id).await?;
    let missing: Vec<Variant> = ctx
        .config
        .quality_profiles
        .iter()
        .filter(|profile| !existing.iter().any(|v| v.quality_profile == profile.name))
        .map(|profile| Variant::new(video_id, profile))
        .collect();

    if missing.is_empty() {
        return Ok(existing);
    }
    ctx.ledger.create_variants(&missing).await?;
    Ok(ctx.ledger.list_variants(video_id).await?)
}

/// Enqueue the root jobs whose rows are still Pending. Returns how many were
/// enqueued.
async fn fan_out(ctx: &PipelineContext, video_id: Uuid, variants: &[Variant]) -> Result<usize> {
    let mut jobs = Vec::new();
    for (stage, job) in [
        (Stage::Transcription, PipelineJob::Transcription { video_id }),
        (
            Stage::ThumbnailGeneration,
            PipelineJob::ThumbnailGeneration { video_id },
        ),
    ] {
        if ctx
            .ledger
            .get_job(video_id, stage)
            .await?
            .is_some_and(|row| row.status == JobStatus::Pending)
        {
            jobs.push(job);
        }
    }
    jobs.extend(
        variants
            .iter()
            .filter(|variant| variant.status == VariantStatus::Pending)
            .map(|variant| PipelineJob::Encoding {
                video_id,
                variant_id: variant.id,
            }),
    );

    for job in &jobs {
        ctx.queue.enqueue(job).await?;
    }
    Ok(jobs.len())
}

/// Drop every stage, variant and artefact of a video, clear its index
/// documents and ingest it again from the stored media reference.
pub async fn reprocess(ctx: &PipelineContext, video_id: Uuid) -> Result<()> {
    let video = ctx
        .ledger
        .get_video(video_id)
        .await?
        .ok_or_else(|| PipelineError::video_not_found(video_id))?;

    ctx.search.delete_by_video(video_id).await?;
    ctx.ledger.purge_pipeline_state(video_id).await?;
    ctx.ledger
        .set_video_status(video_id, VideoStatus::Uploading)
        .await?;

    info!(video_id = %video_id, "Pipeline state purged for reprocess");

    enqueue_ingest(
        ctx,
        video_id,
        &video.media_ref,
        video.language_hint.as_deref(),
    )
    .await?;
    Ok(())
}

/// What a regenerate request did to the AiHighlights stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regeneration {
    Enqueued,
    /// A highlights run is in progress; it will produce fresh results.
    AlreadyRunning,
    /// Nothing to summarize; the stage was marked Skipped.
    EmptyTranscript,
}

/// Re-arm only AI highlights.
pub async fn regenerate_ai(ctx: &PipelineContext, video_id: Uuid) -> Result<Regeneration> {
    if ctx
        .ledger
        .get_job(video_id, Stage::AiHighlights)
        .await?
        .is_none()
    {
        return Err(PipelineError::NotFound {
            entity: "AiHighlights job",
            id: video_id,
        });
    }

    let transcription = ctx.ledger.get_job(video_id, Stage::Transcription).await?;
    if !transcription.is_some_and(|j| j.status == JobStatus::Completed) {
        return Err(PipelineError::Validation(
            "transcription has not completed".to_string(),
        ));
    }

    let segments = ctx.ledger.list_transcript(video_id).await?;
    let enqueued = gates::highlights_gate(ctx, video_id, segments.len()).await?;
    Ok(match (enqueued, segments.is_empty()) {
        (true, _) => Regeneration::Enqueued,
        (false, true) => Regeneration::EmptyTranscript,
        (false, false) => Regeneration::AlreadyRunning,
    })
}

/// Record a reviewer decision on a moderated video.
///
/// Approving a quarantined (or rejected) video re-arms SearchIndexing from
/// Skipped, which succeeds once, so repeated approvals index only once.
/// Rejecting removes the video's search documents.
pub async fn review(
    ctx: &PipelineContext,
    video_id: Uuid,
    decision: ReviewDecision,
    notes: Option<&str>,
) -> Result<()> {
    let video = ctx
        .ledger
        .get_video(video_id)
        .await?
        .ok_or_else(|| PipelineError::video_not_found(video_id))?;

    if !ctx.ledger.record_review(video_id, decision, notes).await? {
        return Err(PipelineError::Validation(format!(
            "video {video_id} has no moderation result to review"
        )));
    }

    match decision {
        ReviewDecision::Approve => {
            if !matches!(
                video.status,
                VideoStatus::Quarantined | VideoStatus::Rejected
            ) {
                info!(video_id = %video_id, status = %video.status, "Approval recorded, nothing to release");
                return Ok(());
            }
            let armed = ctx
                .ledger
                .rearm_job(video_id, Stage::SearchIndexing, &[JobStatus::Skipped])
                .await?;
            if armed {
                ctx.ledger
                    .set_video_status(video_id, VideoStatus::Indexing)
                    .await?;
                ctx.queue
                    .enqueue(&PipelineJob::SearchIndexing { video_id })
                    .await?;
                info!(video_id = %video_id, "Quarantine lifted, search indexing re-armed");
            }
        }
        ReviewDecision::Reject => {
            ctx.ledger
                .transition_video_status(video_id, VideoStatus::Rejected, &[VideoStatus::Failed])
                .await?;
            ctx.ledger
                .skip_job(video_id, Stage::SearchIndexing, &[JobStatus::Pending])
                .await?;
            if let Err(e) = ctx.search.delete_by_video(video_id).await {
                warn!(video_id = %video_id, error = %e, "Failed to remove search documents of rejected video");
            }
            info!(video_id = %video_id, "Video rejected");
        }
    }
    Ok(())
}
