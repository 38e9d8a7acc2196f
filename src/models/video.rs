use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of an uploaded video.
///
/// `Quarantined`, `Rejected`, `Published` and `Failed` are terminal for the
/// automated pipeline; only a reviewer decision or a reprocess moves a video
/// out of them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VideoStatus {
    Uploading,
    Queued,
    Indexing,
    Moderating,
    Quarantined,
    Rejected,
    Published,
    Failed,
}

/// A video under processing. Owned by intake, mutated by handlers and gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAsset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: VideoStatus,
    /// Object key of the uploaded source in the content store.
    pub media_ref: String,
    pub duration_ms: Option<i64>,
    pub language_hint: Option<String>,
    /// Explicit viewers besides the owner while the video is unpublished.
    pub allowed_viewers: Vec<Uuid>,
    pub tags: Vec<String>,
    pub thumbnail_path: Option<String>,
    pub master_playlist_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoAsset {
    pub fn new(owner_id: Uuid, title: impl Into<String>, media_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            description: None,
            status: VideoStatus::Uploading,
            media_ref: media_ref.into(),
            duration_ms: None,
            language_hint: None,
            allowed_viewers: Vec::new(),
            tags: Vec::new(),
            thumbnail_path: None,
            master_playlist_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Owner plus explicit allow-list, deduplicated.
    pub fn principals(&self) -> Vec<Uuid> {
        let mut principals = vec![self.owner_id];
        for viewer in &self.allowed_viewers {
            if !principals.contains(viewer) {
                principals.push(*viewer);
            }
        }
        principals
    }
}
