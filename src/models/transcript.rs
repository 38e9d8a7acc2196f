use serde::{Deserialize, Serialize};

/// One timed span of recognised speech, ordered by `sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub sequence: i32,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    pub detected_language: Option<String>,
    pub speaker: Option<String>,
    pub confidence: Option<f64>,
}

/// Render `[mm:ss] text` lines for downstream language models.
pub fn timestamped_document(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| {
            let secs = s.start_ms / 1000;
            format!("[{:02}:{:02}] {}", secs / 60, secs % 60, s.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
