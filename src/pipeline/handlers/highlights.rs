use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{claim, load_video};
use crate::error::Result;
use crate::models::insights::{HighlightSet, VideoSummary};
use crate::models::job::Stage;
use crate::models::transcript::timestamped_document;
use crate::pipeline::{record_completed, record_failed, PipelineContext};

const MAX_AUTO_TAGS: usize = 10;

/// Best effort: highlights and summary are requested independently and either
/// may fail without affecting the other. The stage fails only when both do.
pub async fn run(ctx: &PipelineContext, video_id: Uuid) -> Result<()> {
    let Some(_job) = claim(ctx, video_id, Stage::AiHighlights).await? else {
        return Ok(());
    };

    let segments = ctx.ledger.list_transcript(video_id).await?;
    if segments.is_empty() {
        info!(video_id = %video_id, "No transcript to extract highlights from");
        ctx.ledger.complete_job(video_id, Stage::AiHighlights).await?;
        return Ok(());
    }
    let video = load_video(ctx, video_id).await?;

    let document = timestamped_document(&segments);
    let language = video
        .language_hint
        .clone()
        .or_else(|| segments[0].detected_language.clone());

    let (extraction, summary) = tokio::join!(
        ctx.highlights
            .extract_highlights(&document, language.as_deref()),
        ctx.highlights.summarize(&document, &video.title),
    );

    let mut tags: Vec<String> = Vec::new();
    let mut auto_description = None;
    let mut succeeded = 0;

    match extraction {
        Ok(extraction) => {
            ctx.ledger
                .replace_highlights(
                    video_id,
                    &HighlightSet {
                        highlights: extraction.highlights,
                        topics: extraction.topics.clone(),
                        sentiment: extraction.sentiment,
                        source_language: extraction.source_language,
                        generated_at: Utc::now(),
                    },
                )
                .await?;
            tags.extend(extraction.topics);
            succeeded += 1;
        }
        Err(e) => warn!(video_id = %video_id, error = %e, "Highlight extraction failed"),
    }

    match summary {
        Ok(summary) => {
            auto_description = Some(summary.tldr.clone());
            tags.extend(summary.keywords.iter().cloned());
            ctx.ledger
                .replace_summary(
                    video_id,
                    &VideoSummary {
                        summary: summary.summary,
                        tldr: summary.tldr,
                        keywords: summary.keywords,
                        source_language: summary.source_language,
                        generated_at: Utc::now(),
                    },
                )
                .await?;
            succeeded += 1;
        }
        Err(e) => warn!(video_id = %video_id, error = %e, "Summarization failed"),
    }

    if succeeded == 0 {
        ctx.ledger
            .fail_job(
                video_id,
                Stage::AiHighlights,
                "highlight extraction and summarization both failed",
            )
            .await?;
        record_failed("ai_highlights");
        return Ok(());
    }

    ctx.ledger
        .backfill_metadata(
            video_id,
            &dedup_tags(tags),
            auto_description.as_deref().filter(|d| !d.trim().is_empty()),
        )
        .await?;
    ctx.ledger.complete_job(video_id, Stage::AiHighlights).await?;
    record_completed("ai_highlights");
    info!(video_id = %video_id, "AI highlights complete");
    Ok(())
}

/// Lowercase, trimmed, first-seen order, capped.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
        if out.len() == MAX_AUTO_TAGS {
            break;
        }
    }
    out
}
