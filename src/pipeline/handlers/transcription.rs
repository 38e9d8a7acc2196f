use tracing::{error, info};
use uuid::Uuid;

use super::{claim, load_video};
use crate::error::Result;
use crate::models::job::Stage;
use crate::models::transcript::TranscriptSegment;
use crate::models::video::VideoStatus;
use crate::pipeline::retry::{self, RetryDecision};
use crate::pipeline::{gates, record_completed, PipelineContext, PipelineJob};

pub async fn run(ctx: &PipelineContext, video_id: Uuid) -> Result<()> {
    let Some(job) = claim(ctx, video_id, Stage::Transcription).await? else {
        return Ok(());
    };
    let video = load_video(ctx, video_id).await?;

    info!(video_id = %video_id, attempts = job.attempts, "Transcribing video");

    match ctx
        .transcriber
        .transcribe(&video.media_ref, video.language_hint.as_deref())
        .await
    {
        Ok(transcription) => {
            let language = transcription.detected_language.clone();
            let segments: Vec<TranscriptSegment> = transcription
                .segments
                .into_iter()
                .enumerate()
                .map(|(i, s)| TranscriptSegment {
                    sequence: i as i32,
                    start_ms: s.start_ms,
                    end_ms: s.end_ms,
                    text: s.text,
                    detected_language: language.clone(),
                    speaker: s.speaker,
                    confidence: s.confidence,
                })
                .collect();

            ctx.ledger.replace_transcript(video_id, &segments).await?;
            if let Some(duration_ms) = transcription.duration_ms {
                ctx.ledger.backfill_duration(video_id, duration_ms).await?;
            }
            ctx.ledger.complete_job(video_id, Stage::Transcription).await?;
            record_completed("transcription");

            info!(
                video_id = %video_id,
                segments = segments.len(),
                language = language.as_deref().unwrap_or("unknown"),
                "Transcription complete"
            );

            gates::moderation_gate(ctx, video_id).await?;
            gates::highlights_gate(ctx, video_id, segments.len()).await?;
        }
        Err(e) => {
            error!(video_id = %video_id, attempts = job.attempts, error = %e, "Transcription failed");

            let decision = retry::requeue_or_fail(
                ctx,
                &PipelineJob::Transcription { video_id },
                Stage::Transcription,
                job.attempts,
                &ctx.config.transcription_retry,
                &e.to_string(),
            )
            .await?;

            if decision == RetryDecision::GiveUp {
                ctx.ledger
                    .set_video_status(video_id, VideoStatus::Failed)
                    .await?;
            }

            gates::moderation_gate(ctx, video_id).await?;
        }
    }

    Ok(())
}
