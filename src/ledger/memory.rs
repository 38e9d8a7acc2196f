use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Ledger, LedgerError, LedgerResult};
use crate::models::insights::{HighlightSet, VideoSummary};
use crate::models::job::{Claim, JobStatus, ProcessingJob, Stage};
use crate::models::moderation::{ModerationResult, ReviewDecision};
use crate::models::transcript::TranscriptSegment;
use crate::models::variant::{Variant, VariantOutput, VariantStatus};
use crate::models::video::{VideoAsset, VideoStatus};

#[derive(Default)]
struct Inner {
    videos: HashMap<Uuid, VideoAsset>,
    jobs: HashMap<(Uuid, Stage), ProcessingJob>,
    variants: HashMap<Uuid, Variant>,
    transcripts: HashMap<Uuid, Vec<TranscriptSegment>>,
    moderation: HashMap<Uuid, ModerationResult>,
    highlights: HashMap<Uuid, HighlightSet>,
    summaries: HashMap<Uuid, VideoSummary>,
    playlist_claims: HashSet<Uuid>,
}

impl Inner {
    fn video_mut(&mut self, id: Uuid) -> LedgerResult<&mut VideoAsset> {
        let video = self
            .videos
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("Video", id))?;
        video.updated_at = Utc::now();
        Ok(video)
    }

    fn job_mut(&mut self, video_id: Uuid, stage: Stage) -> LedgerResult<&mut ProcessingJob> {
        let job = self
            .jobs
            .get_mut(&(video_id, stage))
            .ok_or_else(|| LedgerError::not_found("ProcessingJob", format!("{video_id}/{stage}")))?;
        job.updated_at = Utc::now();
        Ok(job)
    }

    fn variant_mut(&mut self, id: Uuid) -> LedgerResult<&mut Variant> {
        let variant = self
            .variants
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("Variant", id))?;
        variant.updated_at = Utc::now();
        Ok(variant)
    }
}

/// Process-local ledger. Each method holds the lock for its whole body, which
/// gives the same atomicity as the conditional UPDATEs of the Postgres ledger.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn insert_video(&self, video: &VideoAsset) -> LedgerResult<()> {
        self.inner.lock().videos.insert(video.id, video.clone());
        Ok(())
    }

    async fn get_video(&self, id: Uuid) -> LedgerResult<Option<VideoAsset>> {
        Ok(self.inner.lock().videos.get(&id).cloned())
    }

    async fn set_media_source(
        &self,
        id: Uuid,
        media_ref: &str,
        language_hint: Option<&str>,
    ) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let video = inner.video_mut(id)?;
        video.media_ref = media_ref.to_string();
        video.language_hint = language_hint.map(str::to_string);
        Ok(())
    }

    async fn set_video_status(&self, id: Uuid, status: VideoStatus) -> LedgerResult<()> {
        self.inner.lock().video_mut(id)?.status = status;
        Ok(())
    }

    async fn transition_video_status(
        &self,
        id: Uuid,
        to: VideoStatus,
        unless: &[VideoStatus],
    ) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        let video = inner.video_mut(id)?;
        if unless.contains(&video.status) {
            return Ok(false);
        }
        video.status = to;
        Ok(true)
    }

    async fn backfill_duration(&self, id: Uuid, duration_ms: i64) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let video = inner.video_mut(id)?;
        if video.duration_ms.is_none() {
            video.duration_ms = Some(duration_ms);
        }
        Ok(())
    }

    async fn set_thumbnail_path(&self, id: Uuid, path: &str) -> LedgerResult<()> {
        self.inner.lock().video_mut(id)?.thumbnail_path = Some(path.to_string());
        Ok(())
    }

    async fn set_master_playlist_path(&self, id: Uuid, path: Option<&str>) -> LedgerResult<()> {
        self.inner.lock().video_mut(id)?.master_playlist_path = path.map(str::to_string);
        Ok(())
    }

    async fn backfill_metadata(
        &self,
        id: Uuid,
        tags: &[String],
        description: Option<&str>,
    ) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let video = inner.video_mut(id)?;
        if video.tags.is_empty() {
            video.tags = tags.to_vec();
        }
        let has_description = video
            .description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        if !has_description {
            if let Some(description) = description {
                video.description = Some(description.to_string());
            }
        }
        Ok(())
    }

    async fn claim_master_playlist(&self, id: Uuid) -> LedgerResult<bool> {
        Ok(self.inner.lock().playlist_claims.insert(id))
    }

    async fn create_jobs(&self, jobs: &[ProcessingJob]) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        let exists = jobs
            .iter()
            .any(|job| inner.jobs.keys().any(|(video_id, _)| *video_id == job.video_id));
        if exists {
            return Ok(false);
        }
        for job in jobs {
            inner.jobs.insert((job.video_id, job.stage), job.clone());
        }
        Ok(true)
    }

    async fn get_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<Option<ProcessingJob>> {
        Ok(self.inner.lock().jobs.get(&(video_id, stage)).cloned())
    }

    async fn list_jobs(&self, video_id: Uuid) -> LedgerResult<Vec<ProcessingJob>> {
        let inner = self.inner.lock();
        Ok(Stage::ALL
            .iter()
            .filter_map(|stage| inner.jobs.get(&(video_id, *stage)).cloned())
            .collect())
    }

    async fn claim_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<Claim> {
        let mut inner = self.inner.lock();
        let job = inner.job_mut(video_id, stage)?;
        if job.status.is_terminal() {
            return Ok(Claim::AlreadyTerminal(job.status));
        }
        job.status = JobStatus::InProgress;
        job.attempts += 1;
        job.started_at = Some(Utc::now());
        Ok(Claim::Claimed(job.clone()))
    }

    async fn set_job_progress(
        &self,
        video_id: Uuid,
        stage: Stage,
        progress: i32,
    ) -> LedgerResult<()> {
        self.inner.lock().job_mut(video_id, stage)?.progress = progress.clamp(0, 100);
        Ok(())
    }

    async fn complete_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let job = inner.job_mut(video_id, stage)?;
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.last_error = None;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail_job(&self, video_id: Uuid, stage: Stage, error: &str) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let job = inner.job_mut(video_id, stage)?;
        job.status = JobStatus::Failed;
        job.last_error = Some(error.to_string());
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn requeue_job(&self, video_id: Uuid, stage: Stage, error: &str) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let job = inner.job_mut(video_id, stage)?;
        job.status = JobStatus::Pending;
        job.last_error = Some(error.to_string());
        job.progress = 0;
        Ok(())
    }

    async fn rearm_job(
        &self,
        video_id: Uuid,
        stage: Stage,
        from: &[JobStatus],
    ) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        let job = inner.job_mut(video_id, stage)?;
        if !from.contains(&job.status) {
            return Ok(false);
        }
        job.status = JobStatus::Pending;
        job.attempts = 0;
        job.progress = 0;
        job.last_error = None;
        job.started_at = None;
        job.completed_at = None;
        Ok(true)
    }

    async fn skip_job(
        &self,
        video_id: Uuid,
        stage: Stage,
        from: &[JobStatus],
    ) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        let job = inner.job_mut(video_id, stage)?;
        if !from.contains(&job.status) {
            return Ok(false);
        }
        job.status = JobStatus::Skipped;
        job.progress = 100;
        job.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn create_variants(&self, variants: &[Variant]) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        for variant in variants {
            let taken = inner.variants.values().any(|v| {
                v.video_id == variant.video_id && v.quality_profile == variant.quality_profile
            });
            if !taken {
                inner.variants.insert(variant.id, variant.clone());
            }
        }
        Ok(())
    }

    async fn get_variant(&self, id: Uuid) -> LedgerResult<Option<Variant>> {
        Ok(self.inner.lock().variants.get(&id).cloned())
    }

    async fn list_variants(&self, video_id: Uuid) -> LedgerResult<Vec<Variant>> {
        let inner = self.inner.lock();
        let mut variants: Vec<Variant> = inner
            .variants
            .values()
            .filter(|v| v.video_id == video_id)
            .cloned()
            .collect();
        variants.sort_by_key(|v| v.bitrate_kbps);
        Ok(variants)
    }

    async fn claim_variant(&self, id: Uuid) -> LedgerResult<Option<Variant>> {
        let mut inner = self.inner.lock();
        let variant = inner.variant_mut(id)?;
        if variant.status.is_terminal() {
            return Ok(None);
        }
        variant.status = VariantStatus::Encoding;
        Ok(Some(variant.clone()))
    }

    async fn set_variant_progress(&self, id: Uuid, progress: i32) -> LedgerResult<()> {
        self.inner.lock().variant_mut(id)?.progress = progress.clamp(0, 100);
        Ok(())
    }

    async fn complete_variant(&self, id: Uuid, output: &VariantOutput) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let variant = inner.variant_mut(id)?;
        variant.status = VariantStatus::Completed;
        variant.progress = 100;
        variant.playlist_path = Some(output.playlist_path.clone());
        variant.segments_path = Some(output.segments_path.clone());
        variant.size_bytes = Some(output.size_bytes);
        variant.error = None;
        Ok(())
    }

    async fn fail_variant(&self, id: Uuid, error: &str) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let variant = inner.variant_mut(id)?;
        variant.status = VariantStatus::Failed;
        variant.error = Some(error.to_string());
        Ok(())
    }

    async fn replace_transcript(
        &self,
        video_id: Uuid,
        segments: &[TranscriptSegment],
    ) -> LedgerResult<()> {
        let mut ordered = segments.to_vec();
        ordered.sort_by_key(|s| s.sequence);
        self.inner.lock().transcripts.insert(video_id, ordered);
        Ok(())
    }

    async fn list_transcript(&self, video_id: Uuid) -> LedgerResult<Vec<TranscriptSegment>> {
        Ok(self
            .inner
            .lock()
            .transcripts
            .get(&video_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_moderation(
        &self,
        video_id: Uuid,
        result: &ModerationResult,
    ) -> LedgerResult<()> {
        self.inner.lock().moderation.insert(video_id, result.clone());
        Ok(())
    }

    async fn get_moderation(&self, video_id: Uuid) -> LedgerResult<Option<ModerationResult>> {
        Ok(self.inner.lock().moderation.get(&video_id).cloned())
    }

    async fn record_review(
        &self,
        video_id: Uuid,
        decision: ReviewDecision,
        notes: Option<&str>,
    ) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        let Some(result) = inner.moderation.get_mut(&video_id) else {
            return Ok(false);
        };
        result.reviewer_decision = Some(decision);
        result.reviewer_notes = notes.map(str::to_string);
        result.reviewed_at = Some(Utc::now());
        Ok(true)
    }

    async fn replace_highlights(
        &self,
        video_id: Uuid,
        highlights: &HighlightSet,
    ) -> LedgerResult<()> {
        self.inner.lock().highlights.insert(video_id, highlights.clone());
        Ok(())
    }

    async fn get_highlights(&self, video_id: Uuid) -> LedgerResult<Option<HighlightSet>> {
        Ok(self.inner.lock().highlights.get(&video_id).cloned())
    }

    async fn replace_summary(&self, video_id: Uuid, summary: &VideoSummary) -> LedgerResult<()> {
        self.inner.lock().summaries.insert(video_id, summary.clone());
        Ok(())
    }

    async fn get_summary(&self, video_id: Uuid) -> LedgerResult<Option<VideoSummary>> {
        Ok(self.inner.lock().summaries.get(&video_id).cloned())
    }

    async fn purge_pipeline_state(&self, video_id: Uuid) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        inner.jobs.retain(|(id, _), _| *id != video_id);
        inner.variants.retain(|_, v| v.video_id != video_id);
        inner.transcripts.remove(&video_id);
        inner.moderation.remove(&video_id);
        inner.highlights.remove(&video_id);
        inner.summaries.remove(&video_id);
        inner.playlist_claims.remove(&video_id);
        if let Some(video) = inner.videos.get_mut(&video_id) {
            video.master_playlist_path = None;
            video.updated_at = Utc::now();
        }
        Ok(())
    }
}
