use gemma3n_core::error::PipelineError;
use gemma3n_core::ffmpeg::FfmpegDecoder;
use gemma3n_core::sampler::{FrameSampler, SamplingConfig, VideoDecoder};
use gemma3n_core::scratch::ScratchSpace;
use image::imageops;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::tempdir;

const STREAM_2X2: &str =
    r#"{"streams":[{"width":2,"height":2,"time_base":"1/30","duration":"1.0"}]}"#;

#[cfg(unix)]
fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
fn scripted_decoder(dir: &Path, ffmpeg_body: &str) -> FfmpegDecoder {
    let ffprobe = script(dir, "ffprobe", &format!("echo '{STREAM_2X2}'"));
    let ffmpeg = script(dir, "ffmpeg", ffmpeg_body);
    FfmpegDecoder::with_binaries(ffmpeg, ffprobe)
}

#[cfg(unix)]
#[test]
fn timestamps_come_from_the_decoding_pass() {
    let dir = tempdir().unwrap();
    let decoder = scripted_decoder(
        dir.path(),
        r#"echo "[Parsed_showinfo_0 @ 0x1] n:   0 pts:      0 pts_time:0" >&2
head -c 12 /dev/zero
echo "[Parsed_showinfo_0 @ 0x1] n:   1 pts:NOPTS pts_time:NOPTS" >&2
head -c 12 /dev/zero
echo "[Parsed_showinfo_0 @ 0x1] n:   2 pts:      2 pts_time:0.0667" >&2
head -c 12 /dev/zero
exit 0"#,
    );

    let stream = decoder.open(Path::new("clip.mp4")).unwrap();
    let pts: Vec<Option<i64>> = stream.frames.map(|frame| frame.unwrap().pts).collect();
    assert_eq!(pts, vec![Some(0), None, Some(2)]);
}

#[cfg(unix)]
#[test]
fn ffmpeg_failure_mid_stream_is_a_decode_error() {
    let dir = tempdir().unwrap();
    let decoder = scripted_decoder(
        dir.path(),
        r#"echo "[Parsed_showinfo_0 @ 0x1] n:   0 pts:      0 pts_time:0" >&2
head -c 12 /dev/zero
echo "[h264 @ 0x2] corrupt macroblock at 3 7" >&2
exit 1"#,
    );

    let mut frames = decoder.open(Path::new("clip.mp4")).unwrap().frames;
    assert!(frames.next().unwrap().is_ok());
    match frames.next() {
        Some(Err(PipelineError::MediaDecode { reason, .. })) => {
            assert!(reason.contains("corrupt macroblock"), "{reason}")
        }
        other => panic!("expected a decode error, got {:?}", other.map(|r| r.map(|f| f.pts))),
    }
    assert!(frames.next().is_none());
}

fn ffmpeg(args: &[&str]) -> bool {
    Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(args)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn test_clip(dir: &Path) -> Option<PathBuf> {
    let clip = dir.join("testsrc.mp4");
    let made = ffmpeg(&[
        "-f",
        "lavfi",
        "-i",
        "testsrc=size=64x48:rate=30:duration=2",
        "-c:v",
        "mpeg4",
        "-q:v",
        "2",
        clip.to_str()?,
    ]);
    made.then_some(clip)
}

#[test]
fn real_clip_decodes_every_frame_with_timestamps() {
    let decoder = FfmpegDecoder::default();
    if !decoder.is_available() {
        eprintln!("ffmpeg not installed, skipping");
        return;
    }
    let dir = tempdir().unwrap();
    let clip = test_clip(dir.path()).expect("failed to generate test clip");

    let stream = decoder.open(&clip).unwrap();
    assert_eq!((stream.info.width, stream.info.height), (64, 48));
    let time_base = stream.info.time_base;
    let frames: Vec<_> = stream.frames.collect::<Result<_, _>>().unwrap();
    assert_eq!(frames.len(), 60);
    let mut last = f64::NEG_INFINITY;
    for frame in &frames {
        assert_eq!(frame.image.dimensions(), (64, 48));
        let ts = time_base.seconds(frame.pts.expect("frame without pts"));
        assert!(ts > last);
        last = ts;
    }

    let space = ScratchSpace::new(dir.path().join("scratch")).unwrap();
    let mut scope = space.scope();
    let sampler = FrameSampler::new(Arc::new(decoder), SamplingConfig::default());
    let set = sampler.sample(&clip, &mut scope).unwrap();
    assert_eq!(set.len(), 6);
}

#[test]
fn rotated_clip_is_turned_upright_not_garbled() {
    let decoder = FfmpegDecoder::default();
    if !decoder.is_available() {
        eprintln!("ffmpeg not installed, skipping");
        return;
    }
    let dir = tempdir().unwrap();
    let clip = test_clip(dir.path()).expect("failed to generate test clip");
    let rotated = dir.path().join("rotated.mp4");
    // Displayed turned 90 degrees counter-clockwise.
    let tagged = ffmpeg(&[
        "-display_rotation",
        "90",
        "-i",
        clip.to_str().unwrap(),
        "-c",
        "copy",
        rotated.to_str().unwrap(),
    ]);
    if !tagged {
        eprintln!("ffmpeg cannot write display rotation, skipping");
        return;
    }

    let upright = decoder.open(&clip).unwrap().frames.next().unwrap().unwrap();
    let stream = decoder.open(&rotated).unwrap();
    assert_eq!((stream.info.width, stream.info.height), (48, 64));
    let frames: Vec<_> = stream.frames.collect::<Result<_, _>>().unwrap();
    assert_eq!(frames.len(), 60);
    assert_eq!(frames[0].image.dimensions(), (48, 64));
    assert_eq!(imageops::rotate90(&frames[0].image), upright.image);
}
