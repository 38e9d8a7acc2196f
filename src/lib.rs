//! Video processing pipeline
//!
//! Coordinates the stages a freshly uploaded video goes through: transcription,
//! thumbnail extraction, content moderation, multi-variant encoding with a
//! master playlist, search indexing and AI highlights. Stage state is durable
//! in a `Ledger`; work travels as `PipelineJob`s on a `JobQueue`.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
