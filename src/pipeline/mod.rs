//! Stage graph coordination.
//!
//! Intake fans out Transcription, ThumbnailGeneration and one Encoding job
//! per variant. Every handler owns its ledger row and, when it finishes,
//! re-evaluates the gates that depend on it:
//!
//! ```text
//! Transcription ─┬─> moderation gate ─> ContentModeration ─┬─> SearchIndexing
//! Thumbnail ─────┘                                        └─> (quarantine)
//! Transcription ───> highlights gate ─> AiHighlights
//! Encoding × N ────> master playlist gate
//! ```

pub mod coordinator;
pub mod gates;
pub mod handlers;
pub mod retry;
pub mod runner;
pub mod status;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::models::job::Stage;
use crate::services::contracts::{
    ContentSafetyClassifier, Encoder, HighlightExtractor, SearchIndex, ThumbnailExtractor,
    TranscriptionEngine,
};
use crate::services::queue::JobQueue;
use crate::services::storage::ContentStore;

/// A unit of work on the queue. Closed set: one variant per handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineJob {
    Transcription { video_id: Uuid },
    ThumbnailGeneration { video_id: Uuid },
    ContentModeration { video_id: Uuid },
    Encoding { video_id: Uuid, variant_id: Uuid },
    SearchIndexing { video_id: Uuid },
    AiHighlights { video_id: Uuid },
}

impl PipelineJob {
    pub fn video_id(&self) -> Uuid {
        match self {
            PipelineJob::Transcription { video_id }
            | PipelineJob::ThumbnailGeneration { video_id }
            | PipelineJob::ContentModeration { video_id }
            | PipelineJob::Encoding { video_id, .. }
            | PipelineJob::SearchIndexing { video_id }
            | PipelineJob::AiHighlights { video_id } => *video_id,
        }
    }

    /// Metric/log label.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineJob::Transcription { .. } => "transcription",
            PipelineJob::ThumbnailGeneration { .. } => "thumbnail_generation",
            PipelineJob::ContentModeration { .. } => "content_moderation",
            PipelineJob::Encoding { .. } => "encoding",
            PipelineJob::SearchIndexing { .. } => "search_indexing",
            PipelineJob::AiHighlights { .. } => "ai_highlights",
        }
    }

    /// Job that runs a stage row. Encoding has no stage row; it uses variants.
    pub fn for_stage(stage: Stage, video_id: Uuid) -> Option<Self> {
        match stage {
            Stage::Transcription => Some(PipelineJob::Transcription { video_id }),
            Stage::ThumbnailGeneration => Some(PipelineJob::ThumbnailGeneration { video_id }),
            Stage::ContentModeration => Some(PipelineJob::ContentModeration { video_id }),
            Stage::SearchIndexing => Some(PipelineJob::SearchIndexing { video_id }),
            Stage::AiHighlights => Some(PipelineJob::AiHighlights { video_id }),
            Stage::MalwareScan => None,
        }
    }
}

/// Handles passed to every handler invocation. Nothing is global.
#[derive(Clone)]
pub struct PipelineContext {
    pub ledger: Arc<dyn Ledger>,
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn ContentStore>,
    pub transcriber: Arc<dyn TranscriptionEngine>,
    pub classifier: Arc<dyn ContentSafetyClassifier>,
    pub encoder: Arc<dyn Encoder>,
    pub thumbnails: Arc<dyn ThumbnailExtractor>,
    pub highlights: Arc<dyn HighlightExtractor>,
    pub search: Arc<dyn SearchIndex>,
    pub config: Arc<PipelineConfig>,
}

/// Route a job to its handler.
pub async fn dispatch(ctx: &PipelineContext, job: &PipelineJob) -> Result<()> {
    let start = Instant::now();

    let result = match job {
        PipelineJob::Transcription { video_id } => {
            handlers::transcription::run(ctx, *video_id).await
        }
        PipelineJob::ThumbnailGeneration { video_id } => {
            handlers::thumbnail::run(ctx, *video_id).await
        }
        PipelineJob::ContentModeration { video_id } => {
            handlers::moderation::run(ctx, *video_id).await
        }
        PipelineJob::Encoding {
            video_id,
            variant_id,
        } => handlers::encoding::run(ctx, *video_id, *variant_id).await,
        PipelineJob::SearchIndexing { video_id } => handlers::indexing::run(ctx, *video_id).await,
        PipelineJob::AiHighlights { video_id } => handlers::highlights::run(ctx, *video_id).await,
    };

    metrics::histogram!("pipeline_stage_duration_seconds", "stage" => job.kind())
        .record(start.elapsed().as_secs_f64());

    result
}

pub(crate) fn record_completed(kind: &'static str) {
    metrics::counter!("pipeline_stage_completed_total", "stage" => kind).increment(1);
}

pub(crate) fn record_failed(kind: &'static str) {
    metrics::counter!("pipeline_stage_failed_total", "stage" => kind).increment(1);
}
