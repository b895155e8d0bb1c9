#![allow(dead_code)]

use async_trait::async_trait;
use gemma3n_core::error::{BackendError, PipelineError, PipelineResult};
use gemma3n_core::message::GenerationRequest;
use gemma3n_core::sampler::{DecodedFrame, StreamInfo, TimeBase, VideoDecoder, VideoStream};
use gemma3n_core::GenerationBackend;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const TIME_BASE_DEN: i64 = 15360;

/// A constant-rate clip generated in memory.
#[derive(Debug, Clone)]
pub struct SyntheticClip {
    pub duration_secs: f64,
    pub source_fps: f64,
    /// Frame numbers that come out of the decoder without a timestamp.
    pub missing_pts: Vec<usize>,
    /// Frame number at which decoding fails.
    pub fail_at: Option<usize>,
}

impl SyntheticClip {
    pub fn new(duration_secs: f64, source_fps: f64) -> Self {
        Self {
            duration_secs,
            source_fps,
            missing_pts: Vec::new(),
            fail_at: None,
        }
    }
}

/// Decodes every path as the same synthetic clip and records what was opened.
pub struct SyntheticDecoder {
    clip: SyntheticClip,
    opened: Mutex<Vec<PathBuf>>,
}

impl SyntheticDecoder {
    pub fn new(clip: SyntheticClip) -> Self {
        Self {
            clip,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }
}

impl VideoDecoder for SyntheticDecoder {
    fn open(&self, path: &Path) -> PipelineResult<VideoStream> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        let clip = self.clip.clone();
        let count = (clip.duration_secs * clip.source_fps).floor() as usize;
        let video = path.to_path_buf();
        let frames = (0..count).map(move |i| {
            if clip.fail_at == Some(i) {
                return Err(PipelineError::decode(&video, "corrupt packet"));
            }
            let pts = if clip.missing_pts.contains(&i) {
                None
            } else {
                Some((i as f64 * TIME_BASE_DEN as f64 / clip.source_fps).round() as i64)
            };
            let shade = (i % 256) as u8;
            Ok(DecodedFrame {
                pts,
                image: RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade])),
            })
        });
        Ok(VideoStream {
            info: StreamInfo {
                duration_secs: self.clip.duration_secs,
                time_base: TimeBase::new(1, TIME_BASE_DEN),
                width: 8,
                height: 8,
            },
            frames: Box::new(frames),
        })
    }
}

/// Fails to open anything, like a file with no video track.
pub struct BrokenDecoder;

impl VideoDecoder for BrokenDecoder {
    fn open(&self, path: &Path) -> PipelineResult<VideoStream> {
        Err(PipelineError::decode(path, "no decodable video track"))
    }
}

#[derive(Debug, Clone)]
pub struct SeenPart {
    pub label: String,
    pub text: Option<String>,
    pub source: Option<PathBuf>,
    pub existed: bool,
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub system: String,
    pub user: Vec<SeenPart>,
    pub max_tokens: u32,
}

pub enum StubBehavior {
    Reply(String),
    Fail(String),
    Hang,
}

/// Records each request it receives, including whether media files were
/// still on disk at generation time.
pub struct StubBackend {
    behavior: StubBehavior,
    pub inits: AtomicUsize,
    seen: Mutex<Vec<SeenRequest>>,
}

impl StubBackend {
    pub fn replying(reply: &str) -> Self {
        Self::with(StubBehavior::Reply(reply.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(StubBehavior::Fail(message.to_string()))
    }

    pub fn hanging() -> Self {
        Self::with(StubBehavior::Hang)
    }

    fn with(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            inits: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let system = request.system().map(|m| m.text()).unwrap_or_default();
        let user = request
            .user()
            .map(|m| {
                m.parts()
                    .iter()
                    .map(|p| SeenPart {
                        label: p.label().to_string(),
                        text: p.as_text().map(str::to_string),
                        source: p.source().map(Path::to_path_buf),
                        existed: p.source().map(Path::exists).unwrap_or(true),
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.seen.lock().unwrap().push(SeenRequest {
            system,
            user,
            max_tokens: request.max_tokens(),
        });

        match &self.behavior {
            StubBehavior::Reply(reply) => Ok(reply.clone()),
            StubBehavior::Fail(message) => Err(BackendError::new("stub", message.clone())),
            StubBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}

pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
