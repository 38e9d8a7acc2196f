pub mod api;
pub mod insights;
pub mod job;
pub mod moderation;
pub mod transcript;
pub mod variant;
pub mod video;
