//! Deterministic video frame sampling.
//!
//! A video is reduced to at most `max_frames` stills spaced roughly
//! `1 / target_fps` seconds apart. Decoded frames are walked once in
//! presentation order and each target timestamp takes the first frame that
//! lands within half an interval of it, which tolerates variable frame rates
//! without frame-accurate seeking.

use crate::error::{PipelineError, PipelineResult};
use crate::message::ContentPart;
use crate::scratch::ScratchScope;
use image::{ImageFormat, RgbImage};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_TARGET_FPS: f64 = 3.0;
pub const DEFAULT_MAX_FRAMES: usize = 30;

/// Rational seconds-per-tick of a stream's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i64,
    pub den: i64,
}

impl TimeBase {
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    pub fn seconds(&self, pts: i64) -> f64 {
        pts as f64 * self.num as f64 / self.den as f64
    }

    /// Parses the `num/den` form used by ffprobe.
    pub fn parse(value: &str) -> Option<TimeBase> {
        let (num, den) = value.trim().split_once('/')?;
        let num = num.trim().parse().ok()?;
        let den: i64 = den.trim().parse().ok()?;
        if den == 0 {
            return None;
        }
        Some(TimeBase { num, den })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub duration_secs: f64,
    pub time_base: TimeBase,
    pub width: u32,
    pub height: u32,
}

/// A decoded picture. Frames without a presentation timestamp carry `None`.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub pts: Option<i64>,
    pub image: RgbImage,
}

pub type FrameIter = Box<dyn Iterator<Item = PipelineResult<DecodedFrame>> + Send>;

/// An opened video track: its metadata plus frames in presentation order.
pub struct VideoStream {
    pub info: StreamInfo,
    pub frames: FrameIter,
}

/// Opens a video file for sequential decoding.
pub trait VideoDecoder: Send + Sync {
    /// Fails with [`PipelineError::MediaDecode`] when the file cannot be
    /// opened or has no decodable video track.
    fn open(&self, path: &Path) -> PipelineResult<VideoStream>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub target_fps: f64,
    pub max_frames: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> f64 {
        1.0 / self.target_fps
    }

    /// `min(floor(duration * fps), max_frames)`, or zero for unusable inputs.
    pub fn total_frames(&self, duration_secs: f64) -> usize {
        if self.target_fps.is_nan() || self.target_fps <= 0.0 {
            return 0;
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return 0;
        }
        let wanted = (duration_secs * self.target_fps).floor();
        if wanted >= self.max_frames as f64 {
            self.max_frames
        } else {
            wanted as usize
        }
    }

    /// Target timestamps `i * interval` for `i in 0..total`.
    pub fn target_timestamps(&self, duration_secs: f64) -> Vec<f64> {
        let interval = self.interval();
        (0..self.total_frames(duration_secs))
            .map(|i| i as f64 * interval)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    pub index: usize,
    pub path: PathBuf,
    /// Presentation time of the frame that was kept, in seconds.
    pub timestamp: f64,
}

/// The stills picked from one video, ordered by index and playback time.
/// The files live in a scratch directory owned by the dispatch's scope.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSet {
    pub source_video_id: String,
    pub frames: Vec<SampledFrame>,
}

impl FrameSet {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Consumes the set into image parts in playback order.
    pub fn into_parts(self) -> Vec<ContentPart> {
        self.frames
            .into_iter()
            .map(|frame| ContentPart::image(frame.path))
            .collect()
    }
}

pub struct FrameSampler {
    decoder: Arc<dyn VideoDecoder>,
    config: SamplingConfig,
}

impl FrameSampler {
    pub fn new(decoder: Arc<dyn VideoDecoder>, config: SamplingConfig) -> Self {
        Self { decoder, config }
    }

    pub fn config(&self) -> SamplingConfig {
        self.config
    }

    /// Samples `video` with the sampler's configured rate and cap.
    pub fn sample(&self, video: &Path, scope: &mut ScratchScope) -> PipelineResult<FrameSet> {
        self.sample_with(video, self.config, scope)
    }

    pub fn sample_with(
        &self,
        video: &Path,
        config: SamplingConfig,
        scope: &mut ScratchScope,
    ) -> PipelineResult<FrameSet> {
        let started = Instant::now();
        let stream = self.decoder.open(video)?;
        let info = stream.info;

        let targets = config.target_timestamps(info.duration_secs);
        let source_video_id = video
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| video.display().to_string());

        if targets.is_empty() {
            warn!(
                video = %source_video_id,
                duration = info.duration_secs,
                target_fps = config.target_fps,
                "video too short to sample"
            );
            return Ok(FrameSet {
                source_video_id,
                frames: Vec::new(),
            });
        }

        let out_dir = scope.acquire_directory("frames_")?;
        let half_window = config.interval() / 2.0;
        let mut frames = Vec::with_capacity(targets.len());
        let mut idx = 0;

        for decoded in stream.frames {
            let decoded = decoded?;
            let Some(pts) = decoded.pts else {
                continue;
            };
            let ts = info.time_base.seconds(pts);
            if idx < targets.len() && (ts - targets[idx]).abs() < half_window {
                let path = out_dir.path().join(format!("frame_{:04}.jpg", idx));
                decoded
                    .image
                    .save_with_format(&path, ImageFormat::Jpeg)
                    .map_err(|e| PipelineError::Scratch(io::Error::other(e)))?;
                debug!(index = idx, timestamp = ts, "kept frame");
                frames.push(SampledFrame {
                    index: idx,
                    path,
                    timestamp: ts,
                });
                idx += 1;
                if idx == targets.len() {
                    break;
                }
            }
        }

        info!(
            video = %source_video_id,
            frames = frames.len(),
            planned = targets.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sampled video"
        );

        Ok(FrameSet {
            source_video_id,
            frames,
        })
    }
}
