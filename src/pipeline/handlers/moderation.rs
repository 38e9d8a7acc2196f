use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{claim, load_video};
use crate::error::Result;
use crate::models::job::{JobStatus, Stage};
use crate::models::moderation::{ModerationResult, Severity};
use crate::models::transcript::TranscriptSegment;
use crate::models::video::VideoStatus;
use crate::pipeline::{gates, record_completed, PipelineContext, PipelineJob};
use crate::services::contracts::SafetyAnalysis;

/// Reason recorded when classifier errors prevent a confident verdict.
pub const CLASSIFIER_UNAVAILABLE: &str = "classifier_unavailable";

pub async fn run(ctx: &PipelineContext, video_id: Uuid) -> Result<()> {
    if !gates::moderation_prerequisites_met(ctx, video_id).await? {
        warn!(video_id = %video_id, "Moderation delivered before its prerequisites, ignoring");
        return Ok(());
    }
    let Some(_job) = claim(ctx, video_id, Stage::ContentModeration).await? else {
        return Ok(());
    };
    let video = load_video(ctx, video_id).await?;

    ctx.ledger
        .transition_video_status(
            video_id,
            VideoStatus::Moderating,
            &[VideoStatus::Failed, VideoStatus::Rejected],
        )
        .await?;

    let segments = ctx.ledger.list_transcript(video_id).await?;
    let mut texts: Vec<&str> = vec![video.title.as_str()];
    if let Some(description) = video.description.as_deref().filter(|d| !d.trim().is_empty()) {
        texts.push(description);
    }
    texts.extend(
        sample_evenly(&segments, ctx.config.moderation_sample_size)
            .into_iter()
            .map(|s| s.text.as_str()),
    );

    let mut outcomes = Vec::with_capacity(texts.len());
    for text in &texts {
        let outcome = ctx.classifier.analyze_text(text).await.map_err(|e| {
            warn!(video_id = %video_id, error = %e, "Safety classifier call failed");
            e.to_string()
        });
        outcomes.push(outcome);
    }

    let result = aggregate(&outcomes, ctx.config.moderation_fail_open);
    ctx.ledger.save_moderation(video_id, &result).await?;

    let mut armed = false;
    if result.flagged {
        ctx.ledger
            .set_video_status(video_id, VideoStatus::Quarantined)
            .await?;
        ctx.ledger
            .skip_job(
                video_id,
                Stage::SearchIndexing,
                &[JobStatus::Pending, JobStatus::InProgress, JobStatus::Failed],
            )
            .await?;
        info!(
            video_id = %video_id,
            severity = %result.severity,
            reasons = ?result.reasons,
            uncertain = result.uncertain,
            "Video quarantined"
        );
    } else {
        ctx.ledger
            .transition_video_status(
                video_id,
                VideoStatus::Indexing,
                &[VideoStatus::Failed, VideoStatus::Rejected],
            )
            .await?;
        armed = ctx
            .ledger
            .rearm_job(
                video_id,
                Stage::SearchIndexing,
                &[JobStatus::Pending, JobStatus::Skipped, JobStatus::Failed],
            )
            .await?;
        info!(video_id = %video_id, texts = result.texts_analyzed, "Video passed moderation");
    }

    // Indexing only runs behind a completed moderation row.
    ctx.ledger
        .complete_job(video_id, Stage::ContentModeration)
        .await?;
    if armed {
        ctx.queue
            .enqueue(&PipelineJob::SearchIndexing { video_id })
            .await?;
    }
    record_completed("content_moderation");
    Ok(())
}

/// At most `limit` segments spread evenly over the transcript.
pub fn sample_evenly(segments: &[TranscriptSegment], limit: usize) -> Vec<&TranscriptSegment> {
    if segments.len() <= limit {
        return segments.iter().collect();
    }
    (0..limit)
        .map(|i| &segments[i * segments.len() / limit])
        .collect()
}

/// Highest severity and union of distinct reasons across every analysed
/// text. Classifier errors count as safe when `fail_open`, otherwise they
/// make the verdict uncertain and flag the video for review.
pub fn aggregate(outcomes: &[Result<SafetyAnalysis, String>], fail_open: bool) -> ModerationResult {
    let mut flagged = false;
    let mut severity = Severity::None;
    let mut reasons: Vec<String> = Vec::new();
    let mut errors = 0;

    for outcome in outcomes {
        match outcome {
            Ok(analysis) => {
                severity = severity.max(analysis.overall_severity);
                if !analysis.is_safe {
                    flagged = true;
                    for category in &analysis.categories {
                        if !reasons.contains(category) {
                            reasons.push(category.clone());
                        }
                    }
                }
            }
            Err(_) => errors += 1,
        }
    }

    let uncertain = errors > 0 && !fail_open;
    if uncertain {
        flagged = true;
        reasons.push(CLASSIFIER_UNAVAILABLE.to_string());
    }

    ModerationResult {
        flagged,
        uncertain,
        severity,
        reasons,
        texts_analyzed: outcomes.len() as i32,
        classifier_errors: errors,
        reviewer_decision: None,
        reviewer_notes: None,
        analyzed_at: Utc::now(),
        reviewed_at: None,
    }
}
