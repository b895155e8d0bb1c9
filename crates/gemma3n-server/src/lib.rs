//! HTTP surface over the dispatch pipeline.

pub mod error;
pub mod form;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use gemma3n_core::DispatchPipeline;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

pub const DEFAULT_BODY_LIMIT: usize = 512 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: DispatchPipeline,
    pub permits: Arc<Semaphore>,
}

impl AppState {
    /// `max_concurrent` generations may run at once; zero is treated as one.
    pub fn new(pipeline: DispatchPipeline, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/endpoints", get(routes::endpoints))
        .route("/multimodal/", post(routes::multimodal_chat))
        .route("/multimodal/audio_vision", post(routes::audio_vision))
        .route("/multimodal/audio_video", post(routes::audio_video))
        .route("/audio/captioning", post(routes::audio_captioning))
        .route("/audio/event_detection", post(routes::audio_event_detection))
        .route("/vision/image_classification", post(routes::image_classification))
        .route("/vision/image_event_detection", post(routes::image_event_detection))
        .route("/vision/image_change_detection", post(routes::image_change_detection))
        .route("/video/captioning", post(routes::video_captioning))
        .route("/video/event_detection", post(routes::video_event_detection))
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
