//! Scripted collaborators and an in-process pipeline for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use video_pipeline::config::PipelineConfig;
use video_pipeline::error::ExternalError;
use video_pipeline::ledger::MemoryLedger;
use video_pipeline::models::insights::Highlight;
use video_pipeline::models::moderation::Severity;
use video_pipeline::models::variant::{QualityProfile, Variant, VariantOutput};
use video_pipeline::pipeline::retry::RetryPolicy;
use video_pipeline::pipeline::{runner, PipelineContext, PipelineJob};
use video_pipeline::services::contracts::{
    ContentSafetyClassifier, Encoder, HighlightExtraction, HighlightExtractor, SafetyAnalysis,
    SearchDocument, SearchIndex, Summary, ThumbnailExtractor, TranscribedSegment, Transcription,
    TranscriptionEngine,
};
use video_pipeline::services::encoder::{master_playlist_key, render_master_playlist};
use video_pipeline::services::queue::{JobQueue, MemoryJobQueue, QueueError, QueuedJob};
use video_pipeline::services::storage::{ContentStore, StorageError};

/// PNG signature followed by padding; enough for format sniffing.
pub const PNG_FRAME: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d, b'I', b'H', b'D', b'R',
];

/// Object store kept in a map.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn text(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        self.objects.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.lock();
        let data = objects
            .remove(from)
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;
        objects.insert(to.to_string(), data);
        Ok(())
    }
}

/// Fails the first `failures` calls, then returns `segments`.
#[derive(Default)]
pub struct FakeTranscriber {
    pub segments: Mutex<Vec<TranscribedSegment>>,
    pub failures: AtomicU32,
    pub calls: AtomicUsize,
}

impl FakeTranscriber {
    pub fn set_segments(&self, texts: &[&str]) {
        *self.segments.lock() = texts
            .iter()
            .enumerate()
            .map(|(i, text)| TranscribedSegment {
                start_ms: i as i64 * 5_000,
                end_ms: i as i64 * 5_000 + 4_500,
                text: text.to_string(),
                speaker: None,
                confidence: Some(0.9),
            })
            .collect();
    }

    pub fn fail_next(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranscriptionEngine for FakeTranscriber {
    async fn transcribe(
        &self,
        _media_ref: &str,
        _language_hint: Option<&str>,
    ) -> Result<Transcription, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ExternalError::service("transcriber", "model overloaded"));
        }
        let segments = self.segments.lock().clone();
        Ok(Transcription {
            detected_language: Some("en".to_string()),
            duration_ms: segments.last().map(|s| s.end_ms),
            segments,
        })
    }
}

/// Flags any text containing a trigger phrase with High severity.
#[derive(Default)]
pub struct FakeClassifier {
    pub triggers: Mutex<Vec<String>>,
    pub unavailable: AtomicBool,
    pub analyzed: Mutex<Vec<String>>,
}

impl FakeClassifier {
    pub fn with_triggers(triggers: &[&str]) -> Self {
        Self {
            triggers: Mutex::new(triggers.iter().map(|t| t.to_lowercase()).collect()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ContentSafetyClassifier for FakeClassifier {
    async fn analyze_text(&self, text: &str) -> Result<SafetyAnalysis, ExternalError> {
        self.analyzed.lock().push(text.to_string());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ExternalError::service("classifier", "unavailable"));
        }
        let lower = text.to_lowercase();
        let hit = self.triggers.lock().iter().any(|t| lower.contains(t.as_str()));
        Ok(if hit {
            SafetyAnalysis {
                is_safe: false,
                overall_severity: Severity::High,
                categories: vec!["violence".to_string()],
            }
        } else {
            SafetyAnalysis {
                is_safe: true,
                overall_severity: Severity::None,
                categories: vec![],
            }
        })
    }
}

/// Encodes every profile except those listed in `failing_profiles`. Master
/// playlists are rendered for real and written to the shared store.
pub struct FakeEncoder {
    pub store: Arc<MemoryStore>,
    pub failing_profiles: Mutex<Vec<String>>,
    pub encoded: Mutex<Vec<String>>,
    /// Profile names of every manifest written, in manifest order.
    pub manifests: Mutex<Vec<Vec<String>>>,
    pub frame: Mutex<Vec<u8>>,
}

impl FakeEncoder {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            failing_profiles: Mutex::new(Vec::new()),
            encoded: Mutex::new(Vec::new()),
            manifests: Mutex::new(Vec::new()),
            frame: Mutex::new(PNG_FRAME.to_vec()),
        }
    }

    pub fn fail_profile(&self, name: &str) {
        self.failing_profiles.lock().push(name.to_string());
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode_variant(
        &self,
        video_id: Uuid,
        _media_ref: &str,
        profile: &QualityProfile,
    ) -> Result<VariantOutput, ExternalError> {
        if self.failing_profiles.lock().contains(&profile.name) {
            return Err(ExternalError::service("encoder", "ffmpeg exited with 1"));
        }
        self.encoded.lock().push(profile.name.clone());
        let prefix = format!("videos/{video_id}/{}", profile.name);
        Ok(VariantOutput {
            playlist_path: format!("{prefix}/playlist.m3u8"),
            segments_path: format!("{prefix}/segments"),
            size_bytes: profile.bitrate_kbps as i64 * 1_000,
        })
    }

    async fn generate_master_playlist(
        &self,
        video_id: Uuid,
        variants: &[Variant],
    ) -> Result<String, ExternalError> {
        let key = master_playlist_key(video_id);
        let manifest = render_master_playlist(video_id, variants);
        self.store
            .put(&key, manifest.as_bytes(), "application/vnd.apple.mpegurl")
            .await?;
        self.manifests
            .lock()
            .push(variants.iter().map(|v| v.quality_profile.clone()).collect());
        Ok(key)
    }
}

#[async_trait]
impl ThumbnailExtractor for FakeEncoder {
    async fn extract_frame(&self, _media_ref: &str) -> Result<Vec<u8>, ExternalError> {
        Ok(self.frame.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeHighlights {
    pub extract_fails: AtomicBool,
    pub summarize_fails: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl HighlightExtractor for FakeHighlights {
    async fn extract_highlights(
        &self,
        _text: &str,
        language_hint: Option<&str>,
    ) -> Result<HighlightExtraction, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.extract_fails.load(Ordering::SeqCst) {
            return Err(ExternalError::service("highlights", "bad json"));
        }
        Ok(HighlightExtraction {
            highlights: vec![Highlight {
                start_ms: 0,
                end_ms: 4_500,
                title: "Opening".to_string(),
                reason: None,
            }],
            topics: vec!["Cooking".to_string(), "Pasta".to_string()],
            sentiment: Some("positive".to_string()),
            source_language: language_hint.map(str::to_string),
        })
    }

    async fn summarize(&self, _text: &str, title: &str) -> Result<Summary, ExternalError> {
        if self.summarize_fails.load(Ordering::SeqCst) {
            return Err(ExternalError::service("summary", "timeout"));
        }
        Ok(Summary {
            summary: format!("A video called {title}."),
            tldr: format!("All about {title}"),
            keywords: vec!["pasta".to_string(), "dinner".to_string()],
            source_language: None,
        })
    }
}

/// Search index kept per video.
#[derive(Default)]
pub struct FakeSearch {
    pub documents: Mutex<HashMap<Uuid, Vec<SearchDocument>>>,
    pub fail: AtomicBool,
    /// Fail only the n-th `index_batch` call (1-based, 0 for never).
    pub fail_call: AtomicUsize,
    pub calls: AtomicUsize,
    pub batches: AtomicUsize,
}

impl FakeSearch {
    pub fn documents_for(&self, video_id: Uuid) -> Vec<SearchDocument> {
        self.documents.lock().get(&video_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SearchIndex for FakeSearch {
    async fn delete_by_video(&self, video_id: Uuid) -> Result<(), ExternalError> {
        self.documents.lock().remove(&video_id);
        Ok(())
    }

    async fn index_batch(&self, documents: &[SearchDocument]) -> Result<(), ExternalError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) || self.fail_call.load(Ordering::SeqCst) == call {
            return Err(ExternalError::service("search", "index unavailable"));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut index = self.documents.lock();
        for doc in documents {
            let entry = index.entry(doc.video_id).or_default();
            entry.retain(|existing| existing.id != doc.id);
            entry.push(doc.clone());
        }
        Ok(())
    }
}

/// Wraps the in-memory queue; the next `failing_enqueues` enqueues error out
/// as if Redis dropped the connection.
pub struct FlakyQueue {
    pub inner: Arc<MemoryJobQueue>,
    pub failing_enqueues: AtomicU32,
}

impl FlakyQueue {
    pub fn new(inner: Arc<MemoryJobQueue>, failing_enqueues: u32) -> Self {
        Self {
            inner,
            failing_enqueues: AtomicU32::new(failing_enqueues),
        }
    }

    fn take_failure(&self) -> Result<(), QueueError> {
        let failing = self
            .failing_enqueues
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection reset",
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn enqueue(&self, job: &PipelineJob) -> Result<(), QueueError> {
        self.take_failure()?;
        self.inner.enqueue(job).await
    }

    async fn enqueue_delayed(&self, job: &PipelineJob, delay: Duration) -> Result<(), QueueError> {
        self.take_failure()?;
        self.inner.enqueue_delayed(job, delay).await
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        self.inner.dequeue().await
    }

    async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.inner.complete(job).await
    }

    async fn recover_in_flight(&self) -> Result<u64, QueueError> {
        self.inner.recover_in_flight().await
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        self.inner.queue_depth().await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.inner.health_check().await
    }
}

/// A pipeline context wired to in-memory backends, with handles on every fake.
pub struct TestPipeline {
    pub ctx: PipelineContext,
    pub ledger: Arc<MemoryLedger>,
    pub queue: Arc<MemoryJobQueue>,
    pub store: Arc<MemoryStore>,
    pub transcriber: Arc<FakeTranscriber>,
    pub classifier: Arc<FakeClassifier>,
    pub encoder: Arc<FakeEncoder>,
    pub highlights: Arc<FakeHighlights>,
    pub search: Arc<FakeSearch>,
}

/// Three-profile ladder, three transcription attempts and no backoff.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        quality_profiles: ["360p", "720p", "1080p"]
            .iter()
            .filter_map(|name| QualityProfile::from_name(name))
            .collect(),
        transcription_retry: RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        ..PipelineConfig::default()
    }
}

impl TestPipeline {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let store = Arc::new(MemoryStore::default());
        let transcriber = Arc::new(FakeTranscriber::default());
        transcriber.set_segments(&[
            "Welcome to the kitchen.",
            "Today we make fresh pasta.",
            "Thanks for watching.",
        ]);
        let classifier = Arc::new(FakeClassifier::with_triggers(&["attack the city"]));
        let encoder = Arc::new(FakeEncoder::new(store.clone()));
        let highlights = Arc::new(FakeHighlights::default());
        let search = Arc::new(FakeSearch::default());

        let ctx = PipelineContext {
            ledger: ledger.clone(),
            queue: queue.clone(),
            store: store.clone(),
            transcriber: transcriber.clone(),
            classifier: classifier.clone(),
            encoder: encoder.clone(),
            thumbnails: encoder.clone(),
            highlights: highlights.clone(),
            search: search.clone(),
            config: Arc::new(config),
        };

        Self {
            ctx,
            ledger,
            queue,
            store,
            transcriber,
            classifier,
            encoder,
            highlights,
            search,
        }
    }

    /// Run jobs until the queue, including delayed retries, is empty.
    /// Returns how many deliveries were processed.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            self.queue.release_delayed();
            match runner::process_next(&self.ctx).await.expect("queue error") {
                Some(_) => processed += 1,
                None => break,
            }
            assert!(processed < 1_000, "pipeline did not settle");
        }
        processed
    }

    /// Process exactly one delivery. Returns false when nothing was ready.
    pub async fn step(&self) -> bool {
        runner::process_next(&self.ctx)
            .await
            .expect("queue error")
            .is_some()
    }
}
