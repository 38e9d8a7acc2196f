use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::ledger::{Ledger, LedgerError, LedgerResult};
use crate::models::insights::{Highlight, HighlightSet, VideoSummary};
use crate::models::job::{Claim, JobStatus, ProcessingJob, Stage};
use crate::models::moderation::{ModerationResult, ReviewDecision, Severity};
use crate::models::transcript::TranscriptSegment;
use crate::models::variant::{Variant, VariantOutput, VariantStatus};
use crate::models::video::{VideoAsset, VideoStatus};

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

const VIDEO_COLUMNS: &str = r#"
    id, owner_id, title, description, status, media_ref, duration_ms, language_hint,
    allowed_viewers, tags, thumbnail_path, master_playlist_path, created_at, updated_at
"#;

const JOB_COLUMNS: &str = r#"
    video_id, stage, status, attempts, last_error, progress,
    created_at, started_at, completed_at, updated_at
"#;

const VARIANT_COLUMNS: &str = r#"
    id, video_id, quality_profile, width, height, bitrate_kbps, status, progress,
    playlist_path, segments_path, size_bytes, error, created_at, updated_at
"#;

/// PostgreSQL-backed ledger. Conditional transitions are single UPDATE
/// statements guarded by a status predicate.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_video(&self, id: Uuid) -> LedgerResult<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM videos WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(LedgerError::not_found("Video", id))
        }
    }

    async fn ensure_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<ProcessingJob> {
        self.get_job(video_id, stage)
            .await?
            .ok_or_else(|| LedgerError::not_found("ProcessingJob", format!("{video_id}/{stage}")))
    }

    /// Run an UPDATE on `videos` that must hit the given row.
    async fn update_video(&self, id: Uuid, query: PgQuery<'_>) -> LedgerResult<()> {
        if query.execute(&self.pool).await?.rows_affected() == 0 {
            return Err(LedgerError::not_found("Video", id));
        }
        Ok(())
    }

    async fn update_job(&self, video_id: Uuid, stage: Stage, query: PgQuery<'_>) -> LedgerResult<()> {
        if query.execute(&self.pool).await?.rows_affected() == 0 {
            return Err(LedgerError::not_found(
                "ProcessingJob",
                format!("{video_id}/{stage}"),
            ));
        }
        Ok(())
    }

    async fn update_variant(&self, id: Uuid, query: PgQuery<'_>) -> LedgerResult<()> {
        if query.execute(&self.pool).await?.rows_affected() == 0 {
            return Err(LedgerError::not_found("Variant", id));
        }
        Ok(())
    }
}

fn status_list<T: AsRef<str>>(statuses: &[T]) -> Vec<String> {
    statuses.iter().map(|s| s.as_ref().to_string()).collect()
}

fn video_from_row(r: &PgRow) -> LedgerResult<VideoAsset> {
    let status: String = r.try_get("status")?;
    Ok(VideoAsset {
        id: r.try_get("id")?,
        owner_id: r.try_get("owner_id")?,
        title: r.try_get("title")?,
        description: r.try_get("description")?,
        status: VideoStatus::from_str(&status)?,
        media_ref: r.try_get("media_ref")?,
        duration_ms: r.try_get("duration_ms")?,
        language_hint: r.try_get("language_hint")?,
        allowed_viewers: r.try_get("allowed_viewers")?,
        tags: r.try_get("tags")?,
        thumbnail_path: r.try_get("thumbnail_path")?,
        master_playlist_path: r.try_get("master_playlist_path")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn job_from_row(r: &PgRow) -> LedgerResult<ProcessingJob> {
    let stage: String = r.try_get("stage")?;
    let status: String = r.try_get("status")?;
    Ok(ProcessingJob {
        video_id: r.try_get("video_id")?,
        stage: Stage::from_str(&stage)?,
        status: JobStatus::from_str(&status)?,
        attempts: r.try_get("attempts")?,
        last_error: r.try_get("last_error")?,
        progress: r.try_get("progress")?,
        created_at: r.try_get("created_at")?,
        started_at: r.try_get("started_at")?,
        completed_at: r.try_get("completed_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn variant_from_row(r: &PgRow) -> LedgerResult<Variant> {
    let status: String = r.try_get("status")?;
    Ok(Variant {
        id: r.try_get("id")?,
        video_id: r.try_get("video_id")?,
        quality_profile: r.try_get("quality_profile")?,
        width: r.try_get("width")?,
        height: r.try_get("height")?,
        bitrate_kbps: r.try_get("bitrate_kbps")?,
        status: VariantStatus::from_str(&status)?,
        progress: r.try_get("progress")?,
        playlist_path: r.try_get("playlist_path")?,
        segments_path: r.try_get("segments_path")?,
        size_bytes: r.try_get("size_bytes")?,
        error: r.try_get("error")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

#[async_trait]
impl Ledger for PgLedger {
    async fn insert_video(&self, video: &VideoAsset) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO videos (id, owner_id, title, description, status, media_ref, duration_ms,
                                language_hint, allowed_viewers, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(video.id)
        .bind(video.owner_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(video.status.as_ref())
        .bind(&video.media_ref)
        .bind(video.duration_ms)
        .bind(&video.language_hint)
        .bind(&video.allowed_viewers)
        .bind(&video.tags)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_video(&self, id: Uuid) -> LedgerResult<Option<VideoAsset>> {
        let row = sqlx::query(&format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(video_from_row).transpose()
    }

    async fn set_media_source(
        &self,
        id: Uuid,
        media_ref: &str,
        language_hint: Option<&str>,
    ) -> LedgerResult<()> {
        self.update_video(
            id,
            sqlx::query(
                "UPDATE videos SET media_ref = $2, language_hint = $3, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(media_ref)
            .bind(language_hint),
        )
        .await
    }

    async fn set_video_status(&self, id: Uuid, status: VideoStatus) -> LedgerResult<()> {
        self.update_video(
            id,
            sqlx::query("UPDATE videos SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.as_ref()),
        )
        .await
    }

    async fn transition_video_status(
        &self,
        id: Uuid,
        to: VideoStatus,
        unless: &[VideoStatus],
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND NOT (status = ANY($3))
            "#,
        )
        .bind(id)
        .bind(to.as_ref())
        .bind(status_list(unless))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_video(id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn backfill_duration(&self, id: Uuid, duration_ms: i64) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET duration_ms = COALESCE(duration_ms, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_thumbnail_path(&self, id: Uuid, path: &str) -> LedgerResult<()> {
        self.update_video(
            id,
            sqlx::query("UPDATE videos SET thumbnail_path = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(path),
        )
        .await
    }

    async fn set_master_playlist_path(&self, id: Uuid, path: Option<&str>) -> LedgerResult<()> {
        self.update_video(
            id,
            sqlx::query(
                "UPDATE videos SET master_playlist_path = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(path),
        )
        .await
    }

    async fn backfill_metadata(
        &self,
        id: Uuid,
        tags: &[String],
        description: Option<&str>,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET tags = CASE WHEN cardinality(tags) = 0 THEN $2 ELSE tags END,
                description = CASE
                    WHEN description IS NULL OR btrim(description) = '' THEN COALESCE($3, description)
                    ELSE description
                END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(tags)
        .bind(description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_master_playlist(&self, id: Uuid) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET master_playlist_claimed = TRUE, updated_at = NOW()
            WHERE id = $1 AND master_playlist_claimed = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_jobs(&self, jobs: &[ProcessingJob]) -> LedgerResult<bool> {
        let Some(first) = jobs.first() else {
            return Ok(false);
        };
        let mut tx = self.pool.begin().await?;
        let existing: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM processing_jobs WHERE video_id = $1)",
        )
        .bind(first.video_id)
        .fetch_one(&mut *tx)
        .await?;
        if existing {
            tx.rollback().await?;
            return Ok(false);
        }

        let mut inserted = 0;
        for job in jobs {
            inserted += sqlx::query(
                r#"
                INSERT INTO processing_jobs (video_id, stage, status, attempts, progress,
                                             created_at, completed_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (video_id, stage) DO NOTHING
                "#,
            )
            .bind(job.video_id)
            .bind(job.stage.as_ref())
            .bind(job.status.as_ref())
            .bind(job.attempts)
            .bind(job.progress)
            .bind(job.created_at)
            .bind(job.completed_at)
            .bind(job.updated_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        // A concurrent intake won the race; leave its graph untouched.
        if inserted != jobs.len() as u64 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn get_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<Option<ProcessingJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM processing_jobs WHERE video_id = $1 AND stage = $2"
        ))
        .bind(video_id)
        .bind(stage.as_ref())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_jobs(&self, video_id: Uuid) -> LedgerResult<Vec<ProcessingJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM processing_jobs WHERE video_id = $1"
        ))
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = rows.iter().map(job_from_row).collect::<LedgerResult<Vec<_>>>()?;
        jobs.sort_by_key(|j| Stage::ALL.iter().position(|s| *s == j.stage));
        Ok(jobs)
    }

    async fn claim_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<Claim> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE processing_jobs
            SET status = 'in_progress', attempts = attempts + 1,
                started_at = NOW(), updated_at = NOW()
            WHERE video_id = $1 AND stage = $2 AND status IN ('pending', 'in_progress')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(video_id)
        .bind(stage.as_ref())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Claim::Claimed(job_from_row(&r)?)),
            None => Ok(Claim::AlreadyTerminal(
                self.ensure_job(video_id, stage).await?.status,
            )),
        }
    }

    async fn set_job_progress(
        &self,
        video_id: Uuid,
        stage: Stage,
        progress: i32,
    ) -> LedgerResult<()> {
        self.update_job(
            video_id,
            stage,
            sqlx::query(
                r#"
                UPDATE processing_jobs SET progress = $3, updated_at = NOW()
                WHERE video_id = $1 AND stage = $2
                "#,
            )
            .bind(video_id)
            .bind(stage.as_ref())
            .bind(progress.clamp(0, 100)),
        )
        .await
    }

    async fn complete_job(&self, video_id: Uuid, stage: Stage) -> LedgerResult<()> {
        self.update_job(
            video_id,
            stage,
            sqlx::query(
                r#"
                UPDATE processing_jobs
                SET status = 'completed', progress = 100, last_error = NULL,
                    completed_at = NOW(), updated_at = NOW()
                WHERE video_id = $1 AND stage = $2
                "#,
            )
            .bind(video_id)
            .bind(stage.as_ref()),
        )
        .await
    }

    async fn fail_job(&self, video_id: Uuid, stage: Stage, error: &str) -> LedgerResult<()> {
        self.update_job(
            video_id,
            stage,
            sqlx::query(
                r#"
                UPDATE processing_jobs
                SET status = 'failed', last_error = $3, completed_at = NOW(), updated_at = NOW()
                WHERE video_id = $1 AND stage = $2
                "#,
            )
            .bind(video_id)
            .bind(stage.as_ref())
            .bind(error),
        )
        .await
    }

    async fn requeue_job(&self, video_id: Uuid, stage: Stage, error: &str) -> LedgerResult<()> {
        self.update_job(
            video_id,
            stage,
            sqlx::query(
                r#"
                UPDATE processing_jobs
                SET status = 'pending', last_error = $3, progress = 0, updated_at = NOW()
                WHERE video_id = $1 AND stage = $2
                "#,
            )
            .bind(video_id)
            .bind(stage.as_ref())
            .bind(error),
        )
        .await
    }

    async fn rearm_job(
        &self,
        video_id: Uuid,
        stage: Stage,
        from: &[JobStatus],
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'pending', attempts = 0, progress = 0, last_error = NULL,
                started_at = NULL, completed_at = NULL, updated_at = NOW()
            WHERE video_id = $1 AND stage = $2 AND status = ANY($3)
            "#,
        )
        .bind(video_id)
        .bind(stage.as_ref())
        .bind(status_list(from))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_job(video_id, stage).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn skip_job(
        &self,
        video_id: Uuid,
        stage: Stage,
        from: &[JobStatus],
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'skipped', progress = 100, completed_at = NOW(), updated_at = NOW()
            WHERE video_id = $1 AND stage = $2 AND status = ANY($3)
            "#,
        )
        .bind(video_id)
        .bind(stage.as_ref())
        .bind(status_list(from))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_job(video_id, stage).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn create_variants(&self, variants: &[Variant]) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;
        for variant in variants {
            sqlx::query(
                r#"
                INSERT INTO video_variants (id, video_id, quality_profile, width, height,
                                            bitrate_kbps, status, progress, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (video_id, quality_profile) DO NOTHING
                "#,
            )
            .bind(variant.id)
            .bind(variant.video_id)
            .bind(&variant.quality_profile)
            .bind(variant.width)
            .bind(variant.height)
            .bind(variant.bitrate_kbps)
            .bind(variant.status.as_ref())
            .bind(variant.progress)
            .bind(variant.created_at)
            .bind(variant.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_variant(&self, id: Uuid) -> LedgerResult<Option<Variant>> {
        let row = sqlx::query(&format!(
            "SELECT {VARIANT_COLUMNS} FROM video_variants WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(variant_from_row).transpose()
    }

    async fn list_variants(&self, video_id: Uuid) -> LedgerResult<Vec<Variant>> {
        let rows = sqlx::query(&format!(
            "SELECT {VARIANT_COLUMNS} FROM video_variants WHERE video_id = $1 ORDER BY bitrate_kbps"
        ))
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(variant_from_row).collect()
    }

    async fn claim_variant(&self, id: Uuid) -> LedgerResult<Option<Variant>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE video_variants SET status = 'encoding', updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'encoding')
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(variant_from_row(&r)?)),
            None => {
                self.get_variant(id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Variant", id))?;
                Ok(None)
            }
        }
    }

    async fn set_variant_progress(&self, id: Uuid, progress: i32) -> LedgerResult<()> {
        self.update_variant(
            id,
            sqlx::query("UPDATE video_variants SET progress = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(progress.clamp(0, 100)),
        )
        .await
    }

    async fn complete_variant(&self, id: Uuid, output: &VariantOutput) -> LedgerResult<()> {
        self.update_variant(
            id,
            sqlx::query(
                r#"
                UPDATE video_variants
                SET status = 'completed', progress = 100, playlist_path = $2,
                    segments_path = $3, size_bytes = $4, error = NULL, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(&output.playlist_path)
            .bind(&output.segments_path)
            .bind(output.size_bytes),
        )
        .await
    }

    async fn fail_variant(&self, id: Uuid, error: &str) -> LedgerResult<()> {
        self.update_variant(
            id,
            sqlx::query(
                "UPDATE video_variants SET status = 'failed', error = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(error),
        )
        .await
    }

    async fn replace_transcript(
        &self,
        video_id: Uuid,
        segments: &[TranscriptSegment],
    ) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM transcript_segments WHERE video_id = $1")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
        for segment in segments {
            sqlx::query(
                r#"
                INSERT INTO transcript_segments (video_id, sequence, start_ms, end_ms, text,
                                                 detected_language, speaker, confidence)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(video_id)
            .bind(segment.sequence)
            .bind(segment.start_ms)
            .bind(segment.end_ms)
            .bind(&segment.text)
            .bind(&segment.detected_language)
            .bind(&segment.speaker)
            .bind(segment.confidence)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_transcript(&self, video_id: Uuid) -> LedgerResult<Vec<TranscriptSegment>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, start_ms, end_ms, text, detected_language, speaker, confidence
            FROM transcript_segments
            WHERE video_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(TranscriptSegment {
                    sequence: r.try_get("sequence")?,
                    start_ms: r.try_get("start_ms")?,
                    end_ms: r.try_get("end_ms")?,
                    text: r.try_get("text")?,
                    detected_language: r.try_get("detected_language")?,
                    speaker: r.try_get("speaker")?,
                    confidence: r.try_get("confidence")?,
                })
            })
            .collect()
    }

    async fn save_moderation(
        &self,
        video_id: Uuid,
        result: &ModerationResult,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO moderation_results (video_id, flagged, uncertain, severity, reasons,
                                            texts_analyzed, classifier_errors, analyzed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (video_id) DO UPDATE
            SET flagged = EXCLUDED.flagged,
                uncertain = EXCLUDED.uncertain,
                severity = EXCLUDED.severity,
                reasons = EXCLUDED.reasons,
                texts_analyzed = EXCLUDED.texts_analyzed,
                classifier_errors = EXCLUDED.classifier_errors,
                analyzed_at = EXCLUDED.analyzed_at,
                reviewer_decision = NULL,
                reviewer_notes = NULL,
                reviewed_at = NULL
            "#,
        )
        .bind(video_id)
        .bind(result.flagged)
        .bind(result.uncertain)
        .bind(result.severity.as_ref())
        .bind(&result.reasons)
        .bind(result.texts_analyzed)
        .bind(result.classifier_errors)
        .bind(result.analyzed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_moderation(&self, video_id: Uuid) -> LedgerResult<Option<ModerationResult>> {
        let row = sqlx::query(
            r#"
            SELECT flagged, uncertain, severity, reasons, texts_analyzed, classifier_errors,
                   reviewer_decision, reviewer_notes, analyzed_at, reviewed_at
            FROM moderation_results
            WHERE video_id = $1
            "#,
        )
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };
        let severity: String = r.try_get("severity")?;
        let decision: Option<String> = r.try_get("reviewer_decision")?;
        Ok(Some(ModerationResult {
            flagged: r.try_get("flagged")?,
            uncertain: r.try_get("uncertain")?,
            severity: Severity::from_str(&severity)?,
            reasons: r.try_get("reasons")?,
            texts_analyzed: r.try_get("texts_analyzed")?,
            classifier_errors: r.try_get("classifier_errors")?,
            reviewer_decision: decision
                .as_deref()
                .map(ReviewDecision::from_str)
                .transpose()?,
            reviewer_notes: r.try_get("reviewer_notes")?,
            analyzed_at: r.try_get("analyzed_at")?,
            reviewed_at: r.try_get("reviewed_at")?,
        }))
    }

    async fn record_review(
        &self,
        video_id: Uuid,
        decision: ReviewDecision,
        notes: Option<&str>,
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE moderation_results
            SET reviewer_decision = $2, reviewer_notes = $3, reviewed_at = NOW()
            WHERE video_id = $1
            "#,
        )
        .bind(video_id)
        .bind(decision.as_ref())
        .bind(notes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_highlights(
        &self,
        video_id: Uuid,
        highlights: &HighlightSet,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO video_highlights (video_id, highlights, topics, sentiment,
                                          source_language, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (video_id) DO UPDATE
            SET highlights = EXCLUDED.highlights,
                topics = EXCLUDED.topics,
                sentiment = EXCLUDED.sentiment,
                source_language = EXCLUDED.source_language,
                generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(video_id)
        .bind(Json(&highlights.highlights))
        .bind(&highlights.topics)
        .bind(&highlights.sentiment)
        .bind(&highlights.source_language)
        .bind(highlights.generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_highlights(&self, video_id: Uuid) -> LedgerResult<Option<HighlightSet>> {
        let row = sqlx::query(
            r#"
            SELECT highlights, topics, sentiment, source_language, generated_at
            FROM video_highlights
            WHERE video_id = $1
            "#,
        )
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };
        let Json(highlights): Json<Vec<Highlight>> = r.try_get("highlights")?;
        Ok(Some(HighlightSet {
            highlights,
            topics: r.try_get("topics")?,
            sentiment: r.try_get("sentiment")?,
            source_language: r.try_get("source_language")?,
            generated_at: r.try_get("generated_at")?,
        }))
    }

    async fn replace_summary(&self, video_id: Uuid, summary: &VideoSummary) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO video_summaries (video_id, summary, tldr, keywords, source_language,
                                         generated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (video_id) DO UPDATE
            SET summary = EXCLUDED.summary,
                tldr = EXCLUDED.tldr,
                keywords = EXCLUDED.keywords,
                source_language = EXCLUDED.source_language,
                generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(video_id)
        .bind(&summary.summary)
        .bind(&summary.tldr)
        .bind(&summary.keywords)
        .bind(&summary.source_language)
        .bind(summary.generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_summary(&self, video_id: Uuid) -> LedgerResult<Option<VideoSummary>> {
        let row = sqlx::query(
            r#"
            SELECT summary, tldr, keywords, source_language, generated_at
            FROM video_summaries
            WHERE video_id = $1
            "#,
        )
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(VideoSummary {
                summary: r.try_get("summary")?,
                tldr: r.try_get("tldr")?,
                keywords: r.try_get("keywords")?,
                source_language: r.try_get("source_language")?,
                generated_at: r.try_get("generated_at")?,
            })
        })
        .transpose()
    }

    async fn purge_pipeline_state(&self, video_id: Uuid) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "processing_jobs",
            "video_variants",
            "transcript_segments",
            "moderation_results",
            "video_highlights",
            "video_summaries",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE video_id = $1"))
                .bind(video_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            r#"
            UPDATE videos
            SET master_playlist_path = NULL, master_playlist_claimed = FALSE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(video_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
