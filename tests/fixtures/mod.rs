//! Video fixtures for pipeline tests

#![allow(dead_code)]

use uuid::Uuid;

use video_pipeline::ledger::Ledger;
use video_pipeline::models::video::VideoAsset;

/// A video as intake would register it before ingest.
#[derive(Debug, Clone)]
pub struct VideoFixture {
    pub title: &'static str,
    pub description: Option<&'static str>,
    pub media_ref: &'static str,
    pub language_hint: Option<&'static str>,
}

pub const COOKING_VIDEO: VideoFixture = VideoFixture {
    title: "Fresh pasta at home",
    description: Some("A short cooking lesson"),
    media_ref: "uploads/fresh-pasta.mp4",
    language_hint: Some("en"),
};

/// Clean description and transcript; only the title trips the classifier.
pub const FLAGGED_TITLE_VIDEO: VideoFixture = VideoFixture {
    title: "How to attack the city walls",
    description: Some("A history lesson"),
    media_ref: "uploads/walls.mp4",
    language_hint: None,
};

pub const SILENT_VIDEO: VideoFixture = VideoFixture {
    title: "Timelapse of clouds",
    description: None,
    media_ref: "uploads/clouds.mp4",
    language_hint: None,
};

impl VideoFixture {
    pub fn asset(&self) -> VideoAsset {
        let mut video = VideoAsset::new(Uuid::new_v4(), self.title, self.media_ref);
        video.description = self.description.map(str::to_string);
        video.language_hint = self.language_hint.map(str::to_string);
        video.allowed_viewers = vec![Uuid::new_v4()];
        video
    }

    /// Insert the video into the ledger in Uploading state.
    pub async fn seed(&self, ledger: &dyn Ledger) -> VideoAsset {
        let video = self.asset();
        ledger.insert_video(&video).await.expect("insert video");
        video
    }
}
