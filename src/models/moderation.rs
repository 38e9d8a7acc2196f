use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Classifier severity, ordered from harmless to worst.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Aggregated verdict over every analysed text of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub flagged: bool,
    /// Set when classifier errors prevented a confident verdict.
    pub uncertain: bool,
    pub severity: Severity,
    /// Distinct flagged categories, first-seen order.
    pub reasons: Vec<String>,
    pub texts_analyzed: i32,
    pub classifier_errors: i32,
    pub reviewer_decision: Option<ReviewDecision>,
    pub reviewer_notes: Option<String>,
    pub analyzed_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}
