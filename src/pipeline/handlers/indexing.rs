use tracing::{error, info, warn};
use uuid::Uuid;

use super::{claim, load_video};
use crate::error::Result;
use crate::models::job::{JobStatus, Stage};
use crate::models::transcript::TranscriptSegment;
use crate::models::video::{VideoAsset, VideoStatus};
use crate::pipeline::runner::INFRASTRUCTURE_RETRY_DELAY;
use crate::pipeline::{record_completed, record_failed, PipelineContext, PipelineJob};
use crate::services::contracts::{AccessProjection, SearchDocument};

/// Re-index the transcript from scratch, then publish the video unless it was
/// quarantined or rejected meanwhile. Documents are written restricted and
/// opened up once the video is Published; if opening them fails the stage is
/// requeued. Failure of the first batch is terminal for the video.
pub async fn run(ctx: &PipelineContext, video_id: Uuid) -> Result<()> {
    let moderated = ctx
        .ledger
        .get_job(video_id, Stage::ContentModeration)
        .await?
        .is_some_and(|job| job.status == JobStatus::Completed);
    if !moderated {
        warn!(video_id = %video_id, "Indexing delivered before moderation completed, ignoring");
        return Ok(());
    }
    let Some(_job) = claim(ctx, video_id, Stage::SearchIndexing).await? else {
        return Ok(());
    };
    let video = load_video(ctx, video_id).await?;
    let segments = ctx.ledger.list_transcript(video_id).await?;
    let documents = build_documents(&video, &segments);

    let indexed = async {
        ctx.search.delete_by_video(video_id).await?;
        ctx.search.index_batch(&documents).await
    }
    .await;

    match indexed {
        Ok(()) => {
            let was_published = video.status == VideoStatus::Published;
            let published = ctx
                .ledger
                .transition_video_status(
                    video_id,
                    VideoStatus::Published,
                    &[
                        VideoStatus::Quarantined,
                        VideoStatus::Rejected,
                        VideoStatus::Failed,
                    ],
                )
                .await?;
            if published && !was_published && !documents.is_empty() {
                // Same document ids, so this upserts the access projection.
                let published_video = VideoAsset {
                    status: VideoStatus::Published,
                    ..video
                };
                let opened = build_documents(&published_video, &segments);
                if let Err(e) = ctx.search.index_batch(&opened).await {
                    // The rerun sees a Published video and writes open documents.
                    ctx.ledger
                        .requeue_job(video_id, Stage::SearchIndexing, &e.to_string())
                        .await?;
                    ctx.queue
                        .enqueue_delayed(
                            &PipelineJob::SearchIndexing { video_id },
                            INFRASTRUCTURE_RETRY_DELAY,
                        )
                        .await?;
                    warn!(video_id = %video_id, error = %e, "Failed to lift search restriction after publish, indexing requeued");
                    return Ok(());
                }
            }
            ctx.ledger.complete_job(video_id, Stage::SearchIndexing).await?;
            record_completed("search_indexing");
            info!(
                video_id = %video_id,
                documents = documents.len(),
                published,
                "Search indexing complete"
            );
        }
        Err(e) => {
            ctx.ledger
                .fail_job(video_id, Stage::SearchIndexing, &e.to_string())
                .await?;
            ctx.ledger
                .set_video_status(video_id, VideoStatus::Failed)
                .await?;
            record_failed("search_indexing");
            error!(video_id = %video_id, error = %e, "Search indexing failed");
        }
    }

    Ok(())
}

/// Unpublished videos are visible only to the owner and the allow-list.
pub fn access_projection(video: &VideoAsset) -> AccessProjection {
    if video.status == VideoStatus::Published {
        AccessProjection::Unrestricted
    } else {
        AccessProjection::Restricted {
            principals: video.principals(),
        }
    }
}

pub fn build_documents(video: &VideoAsset, segments: &[TranscriptSegment]) -> Vec<SearchDocument> {
    let access = access_projection(video);
    segments
        .iter()
        .map(|segment| SearchDocument {
            id: format!("{}-{}", video.id, segment.sequence),
            video_id: video.id,
            title: video.title.clone(),
            segment_sequence: segment.sequence,
            start_ms: segment.start_ms,
            end_ms: segment.end_ms,
            text: segment.text.clone(),
            language: segment
                .detected_language
                .clone()
                .or_else(|| video.language_hint.clone()),
            access: access.clone(),
        })
        .collect()
}
