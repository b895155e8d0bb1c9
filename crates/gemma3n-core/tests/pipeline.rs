mod common;

use common::{entries, StubBackend, SyntheticClip, SyntheticDecoder};
use gemma3n_core::error::PipelineError;
use gemma3n_core::{
    BackendHandle, ContentNormalizer, DispatchPipeline, DispatchRequest, FrameSampler, RawMedia,
    SamplingConfig, ScratchSpace,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn pipeline(scratch: &Path, backend: Arc<StubBackend>) -> DispatchPipeline {
    let decoder = Arc::new(SyntheticDecoder::new(SyntheticClip::new(2.0, 30.0)));
    DispatchPipeline::new(
        ScratchSpace::new(scratch).unwrap(),
        ContentNormalizer::new(FrameSampler::new(decoder, SamplingConfig::default())),
        BackendHandle::new(backend),
    )
}

#[tokio::test]
async fn upload_is_persisted_for_the_backend_then_removed() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(StubBackend::replying("a tabby cat"));
    let pipeline = pipeline(dir.path(), backend.clone());

    let reply = pipeline
        .run(
            DispatchRequest::new("Describe.", 50)
                .with_user_text("What is this?")
                .with_media(RawMedia::upload("cat.JPG", b"not really a jpeg".to_vec())),
        )
        .await
        .unwrap();

    assert_eq!(reply, "a tabby cat");
    let seen = backend.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].system, "Describe.");
    assert_eq!(seen[0].max_tokens, 50);
    assert_eq!(seen[0].user[0].text.as_deref(), Some("What is this?"));
    assert_eq!(seen[0].user[1].label, "image");
    assert!(seen[0].user[1].existed);
    let upload = seen[0].user[1].source.clone().unwrap();
    assert_eq!(upload.extension().unwrap(), "jpg");
    assert!(!upload.exists());
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn uploaded_video_frames_are_released_after_generation() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(StubBackend::replying("people walking"));
    let pipeline = pipeline(dir.path(), backend.clone());

    pipeline
        .run(
            DispatchRequest::new("Caption.", 150)
                .with_media(RawMedia::upload("walk.mp4", vec![0u8; 16])),
        )
        .await
        .unwrap();

    let seen = backend.seen();
    assert_eq!(seen[0].user.len(), 6);
    assert!(seen[0].user.iter().all(|p| p.label == "image" && p.existed));
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn blank_directive_never_reaches_the_backend() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(StubBackend::replying("unused"));
    let pipeline = pipeline(dir.path(), backend.clone());

    let err = pipeline
        .run(
            DispatchRequest::new("   ", 50)
                .with_media(RawMedia::upload("clip.mp4", vec![1, 2, 3])),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::EmptyDirective));
    assert!(err.is_client_error());
    assert_eq!(backend.calls(), 0);
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn backend_failure_still_releases_scratch() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(StubBackend::failing("out of memory"));
    let pipeline = pipeline(dir.path(), backend.clone());

    let err = pipeline
        .run(
            DispatchRequest::new("Caption.", 10)
                .with_media(RawMedia::upload("a.wav", vec![0u8; 4])),
        )
        .await
        .unwrap_err();

    match err {
        PipelineError::Backend(e) => assert_eq!(e.message, "out of memory"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn abandoned_dispatch_releases_scratch() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(StubBackend::hanging());
    let pipeline = pipeline(dir.path(), backend.clone());

    let result = tokio::time::timeout(
        Duration::from_millis(1000),
        pipeline.run(
            DispatchRequest::new("Caption.", 10)
                .with_media(RawMedia::upload("clip.mp4", vec![0u8; 4])),
        ),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(backend.calls(), 1);
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn local_media_is_left_in_place() {
    let scratch = tempdir().unwrap();
    let media = tempdir().unwrap();
    let image = media.path().join("image.jpg");
    fs::write(&image, b"jpeg").unwrap();
    let backend = Arc::new(StubBackend::replying("ok"));
    let pipeline = pipeline(scratch.path(), backend.clone());

    pipeline
        .run(DispatchRequest::new("Caption.", 100).with_media(RawMedia::local(&image)))
        .await
        .unwrap();

    assert_eq!(backend.seen()[0].user[0].source.as_deref(), Some(image.as_path()));
    assert!(image.exists());
}

#[tokio::test]
async fn zero_token_budget_is_rejected() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(StubBackend::replying("unused"));
    let pipeline = pipeline(dir.path(), backend.clone());

    let err = pipeline.run(DispatchRequest::new("Caption.", 0)).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTokenBudget(0)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn concurrent_dispatches_use_separate_scopes() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(StubBackend::replying("ok"));
    let pipeline = pipeline(dir.path(), backend.clone());

    let runs = (0..4).map(|i| {
        let pipeline = pipeline.clone();
        async move {
            pipeline
                .run(
                    DispatchRequest::new("Caption.", 20)
                        .with_media(RawMedia::upload(format!("{i}.png"), vec![i as u8])),
                )
                .await
        }
    });
    let replies = futures::future::join_all(runs).await;

    assert!(replies.iter().all(|r| r.is_ok()));
    let mut uploads: Vec<_> = backend
        .seen()
        .iter()
        .map(|s| s.user[0].source.clone().unwrap())
        .collect();
    uploads.sort();
    uploads.dedup();
    assert_eq!(uploads.len(), 4);
    assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
    assert_eq!(entries(dir.path()), 0);
}
