//! Durable pipeline state: videos, stage rows, variant rows and the
//! artefacts handlers produce.
//!
//! Every conditional transition (claims, re-arms, skips, the master playlist
//! claim) is a single atomic operation on the implementation side, so
//! handlers and gates can race freely.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::insights::{HighlightSet, VideoSummary};
use crate::models::job::{Claim, JobStatus, ProcessingJob, Stage};
use crate::models::moderation::{ModerationResult, ReviewDecision};
use crate::models::transcript::TranscriptSegment;
use crate::models::variant::{Variant, VariantOutput};
use crate::models::video::{VideoAsset, VideoStatus};

pub use memory::MemoryLedger;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid stored value: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<strum::ParseError> for LedgerError {
    fn from(e: strum::ParseError) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[async_trait]
pub trait Ledger: Send + Sync {
    // ── Videos ──────────────────────────────────────────────────────
    async fn insert_video(&self, video: &VideoAsset) -> LedgerResult<()>;
    async fn get_video(&self, id: Uuid) -> LedgerResult<Option<VideoAsset>>;
    async fn set_media_source(
        &self,
        id: Uuid,
        media_ref: &str,
        language_hint: Option<&str>,
    ) -> LedgerResult<()>;
    async fn set_video_status(&self, id: Uuid, status: VideoStatus) -> LedgerResult<()>;
    /// Move to `to` unless the current status is in `unless`. Returns whether
    /// the transition happened.
    async fn transition_video_status(
        &self,
        id: Uuid,
        to: VideoStatus,
        unless: &[VideoStatus],
    ) -> LedgerResult<bool>;
    /// Set the duration only if it is still unknown.
    async fn backfill_duration(&self, id: Uuid, duration_ms: i64) -> LedgerResult<()>;
    async fn set_thumbnail_path(&self, id: Uuid, path: &str) -> LedgerResult<()>;
    async fn set_master_playlist_path(&self, id: Uuid, path: Option<&str>) -> LedgerResult<()>;
    /// Fill tags and description only where the uploader left them empty.
    async fn backfill_metadata(
        &self,
        id: Uuid,
        tags: &[String],
        description: Option<&str>,
    ) -> LedgerResult<()>;
    /// Atomically take the once-only master playlist claim for a video.
    async fn claim_master_playlist(&self, id: Uuid) -> LedgerResult<bool>;

    // ── Stage rows ──────────────────────────────────────────────────
    /// Insert stage rows; returns false without writing if the video already
    /// has any.
    async fn create_jobs(&self, jobs: &[ProcessingJob]) -> LedgerResult<bool>;
    async fn get_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<Option<ProcessingJob>>;
    async fn list_jobs(&self, video_id: Uuid) -> LedgerResult<Vec<ProcessingJob>>;
    /// Pending/InProgress -> InProgress with `attempts + 1`.
    async fn claim_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<Claim>;
    async fn set_job_progress(&self, video_id: Uuid, stage: Stage, progress: i32)
        -> LedgerResult<()>;
    async fn complete_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<()>;
    async fn fail_job(&self, video_id: Uuid, stage: Stage, error: &str) -> LedgerResult<()>;
    /// Back to Pending for a retry, keeping `attempts` and recording the error.
    async fn requeue_job(&self, video_id: Uuid, stage: Stage, error: &str) -> LedgerResult<()>;
    /// Reset to a fresh Pending row if the current status is in `from`.
    async fn rearm_job(&self, video_id: Uuid, stage: Stage, from: &[JobStatus])
        -> LedgerResult<bool>;
    /// Mark Skipped if the current status is in `from`.
    async fn skip_job(&self, video_id: Uuid, stage: Stage, from: &[JobStatus])
        -> LedgerResult<bool>;

    // ── Variant rows ────────────────────────────────────────────────
    /// Insert variants, skipping any whose video already has that profile.
    async fn create_variants(&self, variants: &[Variant]) -> LedgerResult<()>;
    async fn get_variant(&self, id: Uuid) -> LedgerResult<Option<Variant>>;
    async fn list_variants(&self, video_id: Uuid) -> LedgerResult<Vec<Variant>>;
    /// Pending/Encoding -> Encoding. `None` when the variant is already terminal.
    async fn claim_variant(&self, id: Uuid) -> LedgerResult<Option<Variant>>;
    async fn set_variant_progress(&self, id: Uuid, progress: i32) -> LedgerResult<()>;
    async fn complete_variant(&self, id: Uuid, output: &VariantOutput) -> LedgerResult<()>;
    async fn fail_variant(&self, id: Uuid, error: &str) -> LedgerResult<()>;

    // ── Artefacts ───────────────────────────────────────────────────
    async fn replace_transcript(
        &self,
        video_id: Uuid,
        segments: &[TranscriptSegment],
    ) -> LedgerResult<()>;
    async fn list_transcript(&self, video_id: Uuid) -> LedgerResult<Vec<TranscriptSegment>>;
    async fn save_moderation(&self, video_id: Uuid, result: &ModerationResult)
        -> LedgerResult<()>;
    async fn get_moderation(&self, video_id: Uuid) -> LedgerResult<Option<ModerationResult>>;
    /// Returns false if the video has no moderation result to review.
    async fn record_review(
        &self,
        video_id: Uuid,
        decision: ReviewDecision,
        notes: Option<&str>,
    ) -> LedgerResult<bool>;
    async fn replace_highlights(&self, video_id: Uuid, highlights: &HighlightSet)
        -> LedgerResult<()>;
    async fn get_highlights(&self, video_id: Uuid) -> LedgerResult<Option<HighlightSet>>;
    async fn replace_summary(&self, video_id: Uuid, summary: &VideoSummary) -> LedgerResult<()>;
    async fn get_summary(&self, video_id: Uuid) -> LedgerResult<Option<VideoSummary>>;

    /// Delete every stage row, variant row and artefact of a video and clear
    /// its master playlist and claim. The video row itself stays.
    async fn purge_pipeline_state(&self, video_id: Uuid) -> LedgerResult<()>;
}
