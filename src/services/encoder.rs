use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ExternalError;
use crate::models::variant::{QualityProfile, Variant, VariantOutput};
use crate::services::contracts::{Encoder, ThumbnailExtractor};
use crate::services::storage::ContentStore;

/// Client for the transcoding service. Renditions and frames are produced
/// remotely; master manifests are rendered here and written to the store.
pub struct HttpEncoderClient {
    http: Client,
    base_url: String,
    store: Arc<dyn ContentStore>,
}

#[derive(Deserialize)]
struct EncodeResponse {
    playlist_path: String,
    segments_path: String,
    size_bytes: i64,
}

impl HttpEncoderClient {
    pub fn new(base_url: &str, store: Arc<dyn ContentStore>) -> Result<Self, ExternalError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(3600))
            .build()
            .map_err(ExternalError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        })
    }
}

/// Storage key of a video's master manifest.
pub fn master_playlist_key(video_id: Uuid) -> String {
    format!("videos/{video_id}/master.m3u8")
}

/// Render an HLS master playlist. Variants are listed highest bitrate first;
/// URIs are made relative to the manifest directory when possible.
pub fn render_master_playlist(video_id: Uuid, variants: &[Variant]) -> String {
    let prefix = format!("videos/{video_id}/");
    let mut sorted: Vec<&Variant> = variants.iter().collect();
    sorted.sort_by(|a, b| b.bitrate_kbps.cmp(&a.bitrate_kbps));

    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for variant in sorted {
        let Some(path) = variant.playlist_path.as_deref() else {
            continue;
        };
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},NAME=\"{}\"\n",
            variant.bitrate_kbps as i64 * 1000,
            variant.width,
            variant.height,
            variant.quality_profile
        ));
        playlist.push_str(path.strip_prefix(&prefix).unwrap_or(path));
        playlist.push('\n');
    }
    playlist
}

#[async_trait]
impl Encoder for HttpEncoderClient {
    async fn encode_variant(
        &self,
        video_id: Uuid,
        media_ref: &str,
        profile: &QualityProfile,
    ) -> Result<VariantOutput, ExternalError> {
        let body = serde_json::json!({
            "source": media_ref,
            "output_prefix": format!("videos/{video_id}/{}", profile.name),
            "profile": profile,
            "format": "hls"
        });

        let response = self
            .http
            .post(format!("{}/v1/encode", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(ExternalError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ExternalError::service("encoder", format!("{status}: {text}")));
        }

        let encoded: EncodeResponse = response.json().await.map_err(ExternalError::Http)?;
        Ok(VariantOutput {
            playlist_path: encoded.playlist_path,
            segments_path: encoded.segments_path,
            size_bytes: encoded.size_bytes,
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
        Ok(key)
    }
}

#[async_trait]
impl ThumbnailExtractor for HttpEncoderClient {
    async fn extract_frame(&self, media_ref: &str) -> Result<Vec<u8>, ExternalError> {
        let response = self
            .http
            .post(format!("{}/v1/frames", self.base_url))
            .json(&serde_json::json!({ "source": media_ref, "position": "auto", "format": "jpeg" }))
            .send()
            .await
            .map_err(ExternalError::Http)?;

        if !response.status().is_success() {
            return Err(ExternalError::service(
                "encoder",
                format!("frame extraction returned {}", response.status()),
            ));
        }
        Ok(response.bytes().await.map_err(ExternalError::Http)?.to_vec())
    }
}
