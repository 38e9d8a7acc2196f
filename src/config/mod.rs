use std::time::Duration;

use serde::Deserialize;

use crate::models::variant::QualityProfile;
use crate::pipeline::retry::RetryPolicy;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue
    pub redis_url: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Transcoding service base URL
    pub encoder_url: String,

    /// Search index base URL
    pub search_url: String,

    pub search_api_key: Option<String>,

    /// Encoding ladder, comma separated (e.g., "360p,720p,1080p")
    #[serde(default = "default_quality_profiles")]
    pub quality_profiles: Vec<String>,

    #[serde(default = "default_transcription_max_attempts")]
    pub transcription_max_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    /// Max transcript segments sent to the safety classifier
    #[serde(default = "default_moderation_sample_size")]
    pub moderation_sample_size: usize,

    /// Treat classifier call errors as safe
    #[serde(default = "default_true")]
    pub moderation_fail_open: bool,

    /// Claim a once-only flag before generating the master playlist
    #[serde(default)]
    pub master_playlist_claim: bool,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_quality_profiles() -> Vec<String> {
    vec!["360p".to_string(), "720p".to_string(), "1080p".to_string()]
}

fn default_transcription_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

fn default_retry_backoff_max_ms() -> u64 {
    60_000
}

fn default_moderation_sample_size() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Resolve the handler-facing settings.
    pub fn pipeline(&self) -> Result<PipelineConfig, ConfigError> {
        let quality_profiles = self
            .quality_profiles
            .iter()
            .filter(|name| !name.trim().is_empty())
            .map(|name| {
                QualityProfile::from_name(name)
                    .ok_or_else(|| ConfigError::UnknownQualityProfile(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if quality_profiles.is_empty() {
            return Err(ConfigError::NoQualityProfiles);
        }
        // Variants are unique per (video, profile).
        for (i, profile) in quality_profiles.iter().enumerate() {
            if quality_profiles[..i].iter().any(|p| p.name == profile.name) {
                return Err(ConfigError::DuplicateQualityProfile(profile.name.clone()));
            }
        }
        if self.transcription_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "TRANSCRIPTION_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(PipelineConfig {
            quality_profiles,
            transcription_retry: RetryPolicy::new(
                self.transcription_max_attempts,
                Duration::from_millis(self.retry_backoff_ms),
                Duration::from_millis(self.retry_backoff_max_ms),
            ),
            moderation_sample_size: self.moderation_sample_size,
            moderation_fail_open: self.moderation_fail_open,
            master_playlist_claim: self.master_playlist_claim,
        })
    }
}

/// Settings the coordinator, gates and handlers read.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub quality_profiles: Vec<QualityProfile>,
    pub transcription_retry: RetryPolicy,
    pub moderation_sample_size: usize,
    pub moderation_fail_open: bool,
    pub master_playlist_claim: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality_profiles: default_quality_profiles()
                .iter()
                .filter_map(|name| QualityProfile::from_name(name))
                .collect(),
            transcription_retry: RetryPolicy::new(
                default_transcription_max_attempts(),
                Duration::from_millis(default_retry_backoff_ms()),
                Duration::from_millis(default_retry_backoff_max_ms()),
            ),
            moderation_sample_size: default_moderation_sample_size(),
            moderation_fail_open: true,
            master_playlist_claim: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown quality profile: {0}")]
    UnknownQualityProfile(String),

    #[error("Quality profile listed more than once: {0}")]
    DuplicateQualityProfile(String),

    #[error("At least one quality profile must be configured")]
    NoQualityProfiles,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
