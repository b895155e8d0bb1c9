mod common;

use common::{entries, SyntheticClip, SyntheticDecoder};
use gemma3n_core::error::PipelineError;
use gemma3n_core::sampler::{FrameSampler, SamplingConfig};
use gemma3n_core::scratch::ScratchSpace;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn sampler(clip: SyntheticClip, config: SamplingConfig) -> FrameSampler {
    FrameSampler::new(Arc::new(SyntheticDecoder::new(clip)), config)
}

#[test]
fn ten_second_clip_yields_thirty_frames_near_their_targets() {
    let dir = tempdir().unwrap();
    let space = ScratchSpace::new(dir.path()).unwrap();
    let mut scope = space.scope();

    let frames = sampler(SyntheticClip::new(10.0, 30.0), SamplingConfig::default())
        .sample(Path::new("clip.mp4"), &mut scope)
        .unwrap();

    assert_eq!(frames.source_video_id, "clip.mp4");
    assert_eq!(frames.len(), 30);
    assert_eq!(frames.frames[0].timestamp, 0.0);
    let interval = 1.0 / 3.0;
    for (i, frame) in frames.frames.iter().enumerate() {
        let target = i as f64 * interval;
        assert!(
            (frame.timestamp - target).abs() < interval / 2.0,
            "frame {i} at {} for target {target}",
            frame.timestamp
        );
    }
    for pair in frames.frames.windows(2) {
        assert!(pair[1].timestamp > pair[0].timestamp);
    }
    for (i, frame) in frames.frames.iter().enumerate() {
        assert_eq!(frame.index, i);
        assert!(frame.path.exists());
        assert_eq!(
            frame.path.file_name().unwrap().to_string_lossy(),
            format!("frame_{:04}.jpg", i)
        );
    }
}

#[test]
fn frame_count_never_exceeds_the_plan_and_stays_ordered() {
    let cases = [
        (0.5, 24.0, 3.0, 30),
        (2.0, 25.0, 3.0, 30),
        (4.2, 29.97, 2.0, 5),
        (12.0, 60.0, 3.0, 30),
        (7.0, 10.0, 1.0, 100),
        (3.3, 15.0, 4.0, 8),
    ];
    for (duration, source_fps, target_fps, max_frames) in cases {
        let dir = tempdir().unwrap();
        let space = ScratchSpace::new(dir.path()).unwrap();
        let mut scope = space.scope();
        let config = SamplingConfig {
            target_fps,
            max_frames,
        };

        let frames = sampler(SyntheticClip::new(duration, source_fps), config)
            .sample(Path::new("clip.mov"), &mut scope)
            .unwrap();

        let bound = ((duration * target_fps).floor() as usize).min(max_frames);
        assert!(frames.len() <= bound, "{} > {} for {duration}s", frames.len(), bound);
        for pair in frames.frames.windows(2) {
            assert!(pair[0].index < pair[1].index);
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }
}

#[test]
fn clip_shorter_than_one_interval_yields_nothing() {
    let dir = tempdir().unwrap();
    let space = ScratchSpace::new(dir.path()).unwrap();
    let mut scope = space.scope();

    let frames = sampler(SyntheticClip::new(0.2, 30.0), SamplingConfig::default())
        .sample(Path::new("blink.webm"), &mut scope)
        .unwrap();

    assert!(frames.is_empty());
    assert!(scope.live().is_empty());
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn frames_without_timestamps_are_skipped() {
    let dir = tempdir().unwrap();
    let space = ScratchSpace::new(dir.path()).unwrap();
    let mut scope = space.scope();
    let mut clip = SyntheticClip::new(10.0, 30.0);
    clip.missing_pts = vec![0];

    let frames = sampler(clip, SamplingConfig::default())
        .sample(Path::new("clip.mp4"), &mut scope)
        .unwrap();

    assert_eq!(frames.len(), 30);
    assert_eq!(frames.frames[0].index, 0);
    assert!((frames.frames[0].timestamp - 1.0 / 30.0).abs() < 1e-9);
}

#[test]
fn decode_errors_propagate_and_scope_cleans_up() {
    let dir = tempdir().unwrap();
    let space = ScratchSpace::new(dir.path()).unwrap();
    let mut clip = SyntheticClip::new(10.0, 30.0);
    clip.fail_at = Some(45);

    {
        let mut scope = space.scope();
        let err = sampler(clip, SamplingConfig::default())
            .sample(Path::new("clip.mp4"), &mut scope)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MediaDecode { .. }));
        assert_eq!(scope.live().len(), 1);
    }
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn sample_with_overrides_rate_and_cap() {
    let dir = tempdir().unwrap();
    let space = ScratchSpace::new(dir.path()).unwrap();
    let mut scope = space.scope();
    let sampler = sampler(SyntheticClip::new(10.0, 30.0), SamplingConfig::default());

    let frames = sampler
        .sample_with(
            Path::new("clip.mp4"),
            SamplingConfig {
                target_fps: 1.0,
                max_frames: 4,
            },
            &mut scope,
        )
        .unwrap();

    let stamps: Vec<f64> = frames.frames.iter().map(|f| f.timestamp).collect();
    assert_eq!(stamps.len(), 4);
    for (i, ts) in stamps.iter().enumerate() {
        assert!((ts - i as f64).abs() < 0.5 + 1e-9);
    }
}
