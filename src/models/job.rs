use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// A discrete pipeline phase tracked by its own ledger row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    MalwareScan,
    ContentModeration,
    Transcription,
    ThumbnailGeneration,
    SearchIndexing,
    AiHighlights,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::MalwareScan,
        Stage::ContentModeration,
        Stage::Transcription,
        Stage::ThumbnailGeneration,
        Stage::SearchIndexing,
        Stage::AiHighlights,
    ];
}

/// Status of a stage row.
///
/// Pending -> InProgress -> {Completed | Failed | Pending (retry)}.
/// `Skipped` is set only by a gate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped)
    }
}

/// Durable per-(video, stage) state record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub video_id: Uuid,
    pub stage: Stage,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn new(video_id: Uuid, stage: Stage, status: JobStatus) -> Self {
        let now = Utc::now();
        Self {
            video_id,
            stage,
            status,
            attempts: 0,
            last_error: None,
            progress: if status.is_terminal() { 100 } else { 0 },
            created_at: now,
            started_at: None,
            completed_at: status.is_terminal().then_some(now),
            updated_at: now,
        }
    }
}

/// Outcome of trying to take ownership of a stage row.
#[derive(Debug, Clone)]
pub enum Claim {
    /// The row is now InProgress and belongs to the caller.
    Claimed(ProcessingJob),
    /// The row already reached a terminal state; the delivery is stale.
    AlreadyTerminal(JobStatus),
}
