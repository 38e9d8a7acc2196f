use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// A rung of the encoding ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub bitrate_kbps: i32,
}

/// Built-in ladder: (name, width, height, bitrate kbps).
const LADDER: &[(&str, i32, i32, i32)] = &[
    ("240p", 426, 240, 400),
    ("360p", 640, 360, 800),
    ("480p", 854, 480, 1400),
    ("720p", 1280, 720, 2800),
    ("1080p", 1920, 1080, 5000),
    ("1440p", 2560, 1440, 8000),
    ("2160p", 3840, 2160, 14000),
];

impl QualityProfile {
    /// Resolve a profile by ladder name (e.g. "720p").
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        LADDER
            .iter()
            .find(|(n, ..)| n.eq_ignore_ascii_case(name))
            .map(|&(n, width, height, bitrate_kbps)| Self {
                name: n.to_string(),
                width,
                height,
                bitrate_kbps,
            })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariantStatus {
    Pending,
    Encoding,
    Completed,
    Failed,
}

impl VariantStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, VariantStatus::Completed | VariantStatus::Failed)
    }
}

/// Durable per-(video, quality profile) encode state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub video_id: Uuid,
    pub quality_profile: String,
    pub width: i32,
    pub height: i32,
    pub bitrate_kbps: i32,
    pub status: VariantStatus,
    pub progress: i32,
    pub playlist_path: Option<String>,
    pub segments_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    pub fn new(video_id: Uuid, profile: &QualityProfile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            video_id,
            quality_profile: profile.name.clone(),
            width: profile.width,
            height: profile.height,
            bitrate_kbps: profile.bitrate_kbps,
            status: VariantStatus::Pending,
            progress: 0,
            playlist_path: None,
            segments_path: None,
            size_bytes: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn profile(&self) -> QualityProfile {
        QualityProfile {
            name: self.quality_profile.clone(),
            width: self.width,
            height: self.height,
            bitrate_kbps: self.bitrate_kbps,
        }
    }
}

/// Output locations of a finished encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOutput {
    pub playlist_path: String,
    pub segments_path: String,
    pub size_bytes: i64,
}
