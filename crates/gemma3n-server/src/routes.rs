use crate::error::{ApiError, ApiResult};
use crate::form::{Upload, UploadForm};
use crate::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use gemma3n_core::tasks;
use gemma3n_core::{DispatchRequest, MediaKind};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

const IMAGE: &[MediaKind] = &[MediaKind::Image];
const AUDIO: &[MediaKind] = &[MediaKind::Audio];
const VIDEO: &[MediaKind] = &[MediaKind::Video];

pub const ENDPOINTS: &[&str] = &[
    "/multimodal/ - General multimodal chat with custom system prompts",
    "/audio/captioning - Generate captions for audio content",
    "/audio/event_detection - Detect specific events in audio",
    "/vision/image_classification - Classify images into categories",
    "/vision/image_event_detection - Detect specific events in images",
    "/vision/image_change_detection - Compare two images for changes",
    "/video/captioning - Generate captions for video content",
    "/video/event_detection - Detect specific events in video",
    "/multimodal/audio_vision - Combined audio and image analysis",
    "/multimodal/audio_video - Combined audio and video analysis",
    "/health - Health check",
    "/endpoints - List all available endpoints",
];

#[derive(Debug, Serialize)]
pub struct Reply {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl Reply {
    fn task(reply: String, task: &'static str) -> Self {
        Self {
            reply,
            task: Some(task),
            event: None,
        }
    }

    fn event(mut self, event: &str) -> Self {
        self.event = Some(event.to_string());
        self
    }
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let backend = state.pipeline.backend();
    Json(json!({
        "status": "ok",
        "model": backend.model(),
        "backend": backend.name(),
        "ready": backend.is_ready(),
    }))
}

pub async fn endpoints() -> Json<Value> {
    Json(json!({ "available_endpoints": ENDPOINTS }))
}

/// Waits for a generation slot, then dispatches.
async fn generate(
    state: &AppState,
    task: &'static str,
    system_text: String,
    user_text: &str,
    uploads: Vec<Upload>,
    max_tokens: u32,
) -> ApiResult<String> {
    let mut request = DispatchRequest::new(system_text, max_tokens).with_user_text(user_text);
    for upload in uploads {
        request = request.with_media(upload.into_media());
    }

    let _permit = state
        .permits
        .acquire()
        .await
        .map_err(|_| ApiError::Unavailable("server is shutting down".to_string()))?;
    info!(task, inputs = request.media.len(), max_tokens, "dispatching");
    Ok(state.pipeline.run(request).await?)
}

pub async fn multimodal_chat(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let system_prompt = form.required_text("system_prompt")?.to_string();
    let max_tokens = form.max_tokens(50)?;
    let files = form.take_all("files");
    let reply = generate(
        &state,
        "multimodal",
        system_prompt,
        form.text("user_text"),
        files,
        max_tokens,
    )
    .await?;
    Ok(Json(Reply {
        reply,
        task: None,
        event: None,
    }))
}

pub async fn audio_captioning(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file", AUDIO)?;
    let max_tokens = form.max_tokens(100)?;
    let directive = tasks::caption(MediaKind::Audio).to_string();
    let reply = generate(
        &state,
        "audio_captioning",
        directive,
        form.text("user_text"),
        vec![file],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "audio_captioning")))
}

pub async fn audio_event_detection(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file", AUDIO)?;
    let event = form.required_text("event_description")?.to_string();
    let max_tokens = form.max_tokens(50)?;
    let directive = tasks::event_detection(MediaKind::Audio, &event);
    let reply = generate(
        &state,
        "audio_event_detection",
        directive,
        "",
        vec![file],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "audio_event_detection").event(&event)))
}

pub async fn image_classification(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file", IMAGE)?;
    let max_tokens = form.max_tokens(50)?;
    let directive = tasks::classification(form.text("categories"));
    let reply = generate(
        &state,
        "image_classification",
        directive,
        "",
        vec![file],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "image_classification")))
}

pub async fn image_event_detection(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file", IMAGE)?;
    let event = form.required_text("event_description")?.to_string();
    let max_tokens = form.max_tokens(50)?;
    let directive = tasks::event_detection(MediaKind::Image, &event);
    let reply = generate(
        &state,
        "image_event_detection",
        directive,
        "",
        vec![file],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "image_event_detection").event(&event)))
}

pub async fn image_change_detection(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let first = form.take_file("file1", IMAGE)?;
    let second = form.take_file("file2", IMAGE)?;
    let max_tokens = form.max_tokens(100)?;
    let directive = tasks::CHANGE_DETECTION.to_string();
    let reply = generate(
        &state,
        "image_change_detection",
        directive,
        "",
        vec![first, second],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "image_change_detection")))
}

pub async fn video_captioning(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file", VIDEO)?;
    let max_tokens = form.max_tokens(150)?;
    let directive = tasks::caption(MediaKind::Video).to_string();
    let reply = generate(
        &state,
        "video_captioning",
        directive,
        form.text("user_text"),
        vec![file],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "video_captioning")))
}

pub async fn video_event_detection(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file", VIDEO)?;
    let event = form.required_text("event_description")?.to_string();
    let max_tokens = form.max_tokens(100)?;
    let directive = tasks::video_frames_event_detection(&event);
    let reply = generate(
        &state,
        "video_event_detection",
        directive,
        "",
        vec![file],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "video_event_detection").event(&event)))
}

pub async fn audio_vision(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let audio = form.take_file("audio_file", AUDIO)?;
    let image = form.take_file("image_file", IMAGE)?;
    let max_tokens = form.max_tokens(150)?;
    let directive = tasks::AUDIO_VISION.to_string();
    let reply = generate(
        &state,
        "multimodal_audio_vision",
        directive,
        form.text("user_text"),
        vec![audio, image],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "multimodal_audio_vision")))
}

pub async fn audio_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Reply>> {
    let mut form = UploadForm::read(multipart).await?;
    let audio = form.take_file("audio_file", AUDIO)?;
    let video = form.take_file("video_file", VIDEO)?;
    let max_tokens = form.max_tokens(200)?;
    let directive = tasks::AUDIO_VIDEO.to_string();
    let reply = generate(
        &state,
        "multimodal_audio_video",
        directive,
        form.text("user_text"),
        vec![audio, video],
        max_tokens,
    )
    .await?;
    Ok(Json(Reply::task(reply, "multimodal_audio_video")))
}
