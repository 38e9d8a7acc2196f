use uuid::Uuid;

use super::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::models::api::{ProcessingStatus, StageState, VariantState};
use crate::models::job::{JobStatus, ProcessingJob};
use crate::models::variant::{Variant, VariantStatus};

/// Per-stage and per-variant state of a video plus an aggregate percentage.
pub async fn processing_status(ctx: &PipelineContext, video_id: Uuid) -> Result<ProcessingStatus> {
    let video = ctx
        .ledger
        .get_video(video_id)
        .await?
        .ok_or_else(|| PipelineError::video_not_found(video_id))?;
    let jobs = ctx.ledger.list_jobs(video_id).await?;
    let variants = ctx.ledger.list_variants(video_id).await?;

    Ok(ProcessingStatus {
        video_id,
        video_status: video.status,
        overall_progress: overall_progress(&jobs, &variants),
        stages: jobs
            .iter()
            .map(|job| StageState {
                stage: job.stage,
                status: job.status,
                attempts: job.attempts,
                progress: job_progress(job),
                last_error: job.last_error.clone(),
            })
            .collect(),
        variants: variants
            .iter()
            .map(|variant| VariantState {
                variant_id: variant.id,
                quality_profile: variant.quality_profile.clone(),
                status: variant.status,
                progress: variant.progress,
                error: variant.error.clone(),
            })
            .collect(),
        master_playlist_path: video.master_playlist_path,
    })
}

fn job_progress(job: &ProcessingJob) -> i32 {
    match job.status {
        JobStatus::Pending => 0,
        JobStatus::InProgress => job.progress,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped => 100,
    }
}

fn variant_progress(variant: &Variant) -> i32 {
    match variant.status {
        VariantStatus::Pending => 0,
        VariantStatus::Encoding => variant.progress,
        VariantStatus::Completed | VariantStatus::Failed => 100,
    }
}

/// Mean over every row; terminal rows count as done.
pub fn overall_progress(jobs: &[ProcessingJob], variants: &[Variant]) -> i32 {
    let total = jobs.len() + variants.len();
    if total == 0 {
        return 0;
    }
    let sum: i64 = jobs.iter().map(|j| job_progress(j) as i64).sum::<i64>()
        + variants.iter().map(|v| variant_progress(v) as i64).sum::<i64>();
    (sum / total as i64) as i32
}
