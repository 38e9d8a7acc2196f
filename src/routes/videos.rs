use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Serialize;
use uuid::Uuid;

use super::error::ApiResult;
use crate::app_state::AppState;
use crate::models::api::{CreateVideoRequest, CreateVideoResponse, ProcessingStatus, ReviewRequest};
use crate::error::PipelineError;
use crate::models::video::{VideoAsset, VideoStatus};
use crate::pipeline::coordinator::{self, Regeneration};
use crate::pipeline::status;

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub video_id: Uuid,
    pub enqueued: bool,
    pub message: String,
}

/// POST /api/v1/videos: register an uploaded video and start the pipeline.
pub async fn create_video(
    State(state): State<AppState>,
    Json(request): Json<CreateVideoRequest>,
) -> ApiResult<(StatusCode, Json<CreateVideoResponse>)> {
    request.validate()?;
    let ctx = &state.pipeline;

    let mut video = VideoAsset::new(request.owner_id, request.title, request.media_ref.clone());
    video.description = request.description;
    video.language_hint = request.language_hint.clone();
    video.allowed_viewers = request.allowed_viewers;
    video.tags = request.tags;

    ctx.ledger
        .insert_video(&video)
        .await
        .map_err(PipelineError::from)?;
    coordinator::enqueue_ingest(
        ctx,
        video.id,
        &request.media_ref,
        request.language_hint.as_deref(),
    )
    .await?;

    tracing::info!(video_id = %video.id, owner_id = %video.owner_id, "Video submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateVideoResponse {
            video_id: video.id,
            status: VideoStatus::Queued,
            message: "Video queued for processing".to_string(),
        }),
    ))
}

/// GET /api/v1/videos/{video_id}/processing: stage and variant progress.
pub async fn get_processing_status(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Json<ProcessingStatus>> {
    Ok(Json(status::processing_status(&state.pipeline, video_id).await?))
}

/// POST /api/v1/videos/{video_id}/reprocess: rerun the whole pipeline.
pub async fn reprocess_video(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<ActionResponse>)> {
    coordinator::reprocess(&state.pipeline, video_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ActionResponse {
            video_id,
            enqueued: true,
            message: "Video queued for reprocessing".to_string(),
        }),
    ))
}

/// POST /api/v1/videos/{video_id}/regenerate-ai: rerun AI highlights only.
pub async fn regenerate_ai(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<ActionResponse>)> {
    let (enqueued, message) = match coordinator::regenerate_ai(&state.pipeline, video_id).await? {
        Regeneration::Enqueued => (true, "AI highlights queued for regeneration"),
        Regeneration::AlreadyRunning => (false, "AI highlights are already being generated"),
        Regeneration::EmptyTranscript => (false, "Transcript is empty, AI highlights skipped"),
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(ActionResponse {
            video_id,
            enqueued,
            message: message.to_string(),
        }),
    ))
}

/// POST /api/v1/videos/{video_id}/review: approve or reject a moderated video.
pub async fn review_video(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Json<ProcessingStatus>> {
    request.validate()?;
    coordinator::review(
        &state.pipeline,
        video_id,
        request.decision,
        request.notes.as_deref(),
    )
    .await?;
    Ok(Json(status::processing_status(&state.pipeline, video_id).await?))
}
