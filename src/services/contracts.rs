//! Narrow interfaces the pipeline calls on external engines.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExternalError;
use crate::models::insights::Highlight;
use crate::models::moderation::Severity;
use crate::models::variant::{QualityProfile, Variant, VariantOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribedSegment {
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub detected_language: Option<String>,
    pub duration_ms: Option<i64>,
    pub segments: Vec<TranscribedSegment>,
}

#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(
        &self,
        media_ref: &str,
        language_hint: Option<&str>,
    ) -> Result<Transcription, ExternalError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAnalysis {
    pub is_safe: bool,
    pub overall_severity: Severity,
    pub categories: Vec<String>,
}

#[async_trait]
pub trait ContentSafetyClassifier: Send + Sync {
    async fn analyze_text(&self, text: &str) -> Result<SafetyAnalysis, ExternalError>;
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode_variant(
        &self,
        video_id: Uuid,
        media_ref: &str,
        profile: &QualityProfile,
    ) -> Result<VariantOutput, ExternalError>;

    /// Write the master manifest for the given completed variants and return
    /// its path. Must overwrite any previous manifest.
    async fn generate_master_playlist(
        &self,
        video_id: Uuid,
        variants: &[Variant],
    ) -> Result<String, ExternalError>;
}

#[async_trait]
pub trait ThumbnailExtractor: Send + Sync {
    /// Extract a still frame as encoded image bytes.
    async fn extract_frame(&self, media_ref: &str) -> Result<Vec<u8>, ExternalError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightExtraction {
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub source_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub tldr: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub source_language: Option<String>,
}

#[async_trait]
pub trait HighlightExtractor: Send + Sync {
    async fn extract_highlights(
        &self,
        text: &str,
        language_hint: Option<&str>,
    ) -> Result<HighlightExtraction, ExternalError>;

    async fn summarize(&self, text: &str, title: &str) -> Result<Summary, ExternalError>;
}

/// Who may see a search document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum AccessProjection {
    Unrestricted,
    Restricted { principals: Vec<Uuid> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub video_id: Uuid,
    pub title: String,
    pub segment_sequence: i32,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    pub language: Option<String>,
    pub access: AccessProjection,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn delete_by_video(&self, video_id: Uuid) -> Result<(), ExternalError>;
    async fn index_batch(&self, documents: &[SearchDocument]) -> Result<(), ExternalError>;
}
