use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ExternalError;
use crate::models::moderation::Severity;
use crate::services::contracts::{
    ContentSafetyClassifier, HighlightExtraction, HighlightExtractor, SafetyAnalysis, Summary,
    TranscribedSegment, Transcription, TranscriptionEngine,
};
use crate::services::storage::ContentStore;

const WHISPER_MODEL: &str = "@cf/openai/whisper-large-v3-turbo";
const GUARD_MODEL: &str = "@cf/meta/llama-guard-3-8b";
const TEXT_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

/// Client for Cloudflare Workers AI: speech-to-text, safety classification
/// and transcript highlights/summaries.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
    store: Arc<dyn ContentStore>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct WhisperResult {
    #[serde(default)]
    transcription_info: Option<WhisperInfo>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Deserialize)]
struct WhisperInfo {
    language: Option<String>,
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Deserialize)]
struct GuardResult {
    response: GuardVerdict,
}

#[derive(Deserialize)]
struct GuardVerdict {
    safe: bool,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Deserialize)]
struct TextResult {
    response: String,
}

impl WorkersAiClient {
    pub fn new(
        account_id: &str,
        api_token: &str,
        store: Arc<dyn ContentStore>,
    ) -> Result<Self, ExternalError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(ExternalError::Http)?;
        Ok(Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            store,
        })
    }

    async fn run<T: DeserializeOwned>(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<T, ExternalError> {
        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, model
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(ExternalError::Http)?
            .error_for_status()
            .map_err(ExternalError::Http)?;

        let envelope: Envelope<T> = response.json().await.map_err(ExternalError::Http)?;
        match envelope.result {
            Some(result) if envelope.success => Ok(result),
            _ => Err(ExternalError::service(
                "workers-ai",
                serde_json::Value::Array(envelope.errors).to_string(),
            )),
        }
    }

    /// Prompt the text model and parse its reply as JSON.
    async fn complete_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, ExternalError> {
        let body = serde_json::json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "max_tokens": 1024
        });
        let result: TextResult = self.run(TEXT_MODEL, &body).await?;
        serde_json::from_str(extract_json(&result.response)).map_err(ExternalError::Parse)
    }
}

/// Strip any prose the model wraps around its JSON object.
fn extract_json(reply: &str) -> &str {
    match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply,
    }
}

/// Llama Guard hazard categories mapped onto pipeline severities.
fn guard_severity(categories: &[String]) -> Severity {
    categories
        .iter()
        .map(|c| match c.as_str() {
            "S1" | "S3" | "S4" | "S9" | "S11" => Severity::Critical,
            "S2" | "S10" | "S12" => Severity::High,
            "S5" | "S6" | "S7" | "S13" | "S14" => Severity::Medium,
            _ => Severity::Low,
        })
        .max()
        .unwrap_or(Severity::Medium)
}

#[async_trait]
impl TranscriptionEngine for WorkersAiClient {
    async fn transcribe(
        &self,
        media_ref: &str,
        language_hint: Option<&str>,
    ) -> Result<Transcription, ExternalError> {
        let audio = self.store.fetch(media_ref).await?;

        let mut body = serde_json::json!({
            "audio": base64::engine::general_purpose::STANDARD.encode(&audio),
            "task": "transcribe",
            "vad_filter": true
        });
        if let Some(language) = language_hint {
            body["language"] = serde_json::Value::String(language.to_string());
        }

        let result: WhisperResult = self.run(WHISPER_MODEL, &body).await?;
        let info = result.transcription_info;

        Ok(Transcription {
            detected_language: info.as_ref().and_then(|i| i.language.clone()),
            duration_ms: info
                .and_then(|i| i.duration)
                .map(|secs| (secs * 1000.0) as i64),
            segments: result
                .segments
                .into_iter()
                .filter(|s| !s.text.trim().is_empty())
                .map(|s| TranscribedSegment {
                    start_ms: (s.start * 1000.0) as i64,
                    end_ms: (s.end * 1000.0) as i64,
                    text: s.text.trim().to_string(),
                    speaker: None,
                    confidence: None,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl ContentSafetyClassifier for WorkersAiClient {
    async fn analyze_text(&self, text: &str) -> Result<SafetyAnalysis, ExternalError> {
        let body = serde_json::json!({
            "messages": [{ "role": "user", "content": text }],
            "response_format": { "type": "json_object" }
        });
        let result: GuardResult = self.run(GUARD_MODEL, &body).await?;
        let verdict = result.response;

        Ok(SafetyAnalysis {
            is_safe: verdict.safe,
            overall_severity: if verdict.safe {
                Severity::None
            } else {
                guard_severity(&verdict.categories)
            },
            categories: verdict.categories,
        })
    }
}

#[async_trait]
impl HighlightExtractor for WorkersAiClient {
    async fn extract_highlights(
        &self,
        text: &str,
        language_hint: Option<&str>,
    ) -> Result<HighlightExtraction, ExternalError> {
        let system = concat!(
            "You extract highlights from timestamped video transcripts. ",
            "Reply ONLY with JSON: {\"highlights\": [{\"start_ms\", \"end_ms\", \"title\", \"reason\"}], ",
            "\"topics\": [string], \"sentiment\": string, \"source_language\": string}. ",
            "Timestamps in the transcript are [mm:ss]; convert them to milliseconds."
        );
        let user = match language_hint {
            Some(language) => format!("Language: {language}\n\n{text}"),
            None => text.to_string(),
        };
        self.complete_json(system, &user).await
    }

    async fn summarize(&self, text: &str, title: &str) -> Result<Summary, ExternalError> {
        let system = concat!(
            "You summarize video transcripts. Reply ONLY with JSON: ",
            "{\"summary\": string, \"tldr\": string, \"keywords\": [string], ",
            "\"source_language\": string}."
        );
        let user = format!("Title: {title}\n\n{text}");
        self.complete_json(system, &user).await
    }
}
