use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobStatus, Stage};
use crate::models::moderation::ReviewDecision;
use crate::models::variant::VariantStatus;
use crate::models::video::VideoStatus;

/// Request to register an uploaded video and start processing it.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateVideoRequest {
    #[garde(skip)]
    pub owner_id: Uuid,

    #[garde(length(min = 1, max = 300))]
    pub title: String,

    #[garde(length(max = 5000))]
    pub description: Option<String>,

    #[garde(length(min = 1, max = 1024))]
    pub media_ref: String,

    #[garde(length(min = 2, max = 16))]
    pub language_hint: Option<String>,

    #[serde(default)]
    #[garde(skip)]
    pub allowed_viewers: Vec<Uuid>,

    #[serde(default)]
    #[garde(length(max = 50))]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateVideoResponse {
    pub video_id: Uuid,
    pub status: VideoStatus,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[garde(skip)]
    pub decision: ReviewDecision,

    #[garde(length(max = 2000))]
    pub notes: Option<String>,
}

/// Per-stage view returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    pub stage: Stage,
    pub status: JobStatus,
    pub attempts: i32,
    pub progress: i32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantState {
    pub variant_id: Uuid,
    pub quality_profile: String,
    pub status: VariantStatus,
    pub progress: i32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub video_id: Uuid,
    pub video_status: VideoStatus,
    pub stages: Vec<StageState>,
    pub variants: Vec<VariantState>,
    /// 0-100 across every stage and variant row.
    pub overall_progress: i32,
    pub master_playlist_path: Option<String>,
}
