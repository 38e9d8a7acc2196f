use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub start_ms: i64,
    pub end_ms: i64,
    pub title: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Highlights extracted from a transcript. Replaced wholesale on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightSet {
    pub highlights: Vec<Highlight>,
    pub topics: Vec<String>,
    pub sentiment: Option<String>,
    pub source_language: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Summary of a transcript. Replaced wholesale on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub summary: String,
    pub tldr: String,
    pub keywords: Vec<String>,
    pub source_language: Option<String>,
    pub generated_at: DateTime<Utc>,
}
