//! [`VideoDecoder`] backed by the system `ffprobe` and `ffmpeg` binaries.
//!
//! Nothing is linked. `ffprobe` reads the stream header only, then a single
//! `ffmpeg` process decodes the track: raw rgb24 frames go to stdout and a
//! `showinfo` filter logs each frame's timestamp on stderr just before the
//! frame is written. Killing the child ends decoding.

use crate::error::{PipelineError, PipelineResult};
use crate::sampler::{DecodedFrame, StreamInfo, TimeBase, VideoDecoder, VideoStream};
use image::{imageops, RgbImage};
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use tracing::debug;

const STDERR_TAIL: usize = 8;

#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegDecoder {
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// True when both tools answer `-version`.
    pub fn is_available(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|bin| {
            Command::new(bin)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }

    fn probe_stream(&self, path: &Path) -> PipelineResult<ProbedStream> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_streams", "-show_format", "-of", "json"])
            .arg(path)
            .output()
            .map_err(|e| PipelineError::decode(path, format!("failed to run ffprobe: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::decode(path, format!("ffprobe failed: {}", stderr.trim())));
        }
        parse_probe(&output.stdout).map_err(|reason| PipelineError::decode(path, reason))
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> PipelineResult<VideoStream> {
        let probed = self.probe_stream(path)?;
        debug!(
            video = %path.display(),
            info = ?probed.info,
            quarter_turns = probed.quarter_turns,
            "probed video"
        );

        // Rotation is applied per frame so the pipe always carries coded dimensions.
        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-nostats", "-loglevel", "info", "-nostdin"])
            .args(["-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-vf", "showinfo", "-fps_mode", "passthrough"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::decode(path, format!("failed to run ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::decode(path, "ffmpeg produced no output pipe"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::decode(path, "ffmpeg produced no log pipe"))?;

        let frames = RawFrames {
            child,
            stdout,
            stderr: BufReader::new(stderr),
            tail: VecDeque::with_capacity(STDERR_TAIL),
            width: probed.coded_width,
            height: probed.coded_height,
            quarter_turns: probed.quarter_turns,
            path: path.to_path_buf(),
            finished: false,
        };
        Ok(VideoStream {
            info: probed.info,
            frames: Box::new(frames),
        })
    }
}

/// Raw rgb24 frames read off the ffmpeg pipe, each paired with the
/// timestamp `showinfo` logged for it.
struct RawFrames {
    child: Child,
    stdout: ChildStdout,
    stderr: BufReader<ChildStderr>,
    tail: VecDeque<String>,
    width: u32,
    height: u32,
    quarter_turns: u8,
    path: PathBuf,
    finished: bool,
}

impl RawFrames {
    /// Next stderr line, or `None` once ffmpeg closed the pipe.
    fn read_log_line(&mut self) -> Option<String> {
        let mut raw = Vec::new();
        match self.stderr.read_until(b'\n', &mut raw) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(String::from_utf8_lossy(&raw).trim_end().to_string()),
        }
    }

    fn remember(&mut self, line: String) {
        if line.is_empty() {
            return;
        }
        if self.tail.len() == STDERR_TAIL {
            self.tail.pop_front();
        }
        self.tail.push_back(line);
    }

    /// Timestamp of the frame just read from stdout.
    fn next_pts(&mut self) -> Option<i64> {
        while let Some(line) = self.read_log_line() {
            match parse_showinfo_pts(&line) {
                Some(pts) => return pts,
                None => self.remember(line),
            }
        }
        None
    }

    /// Drains the log and reaps ffmpeg once stdout is exhausted.
    fn finish(&mut self) -> Option<PipelineResult<DecodedFrame>> {
        self.finished = true;
        while let Some(line) = self.read_log_line() {
            if parse_showinfo_pts(&line).is_none() {
                self.remember(line);
            }
        }
        match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => {
                let log = self.tail.iter().cloned().collect::<Vec<_>>().join("; ");
                Some(Err(PipelineError::decode(
                    &self.path,
                    format!("ffmpeg exited with {}: {}", status, log),
                )))
            }
            Err(e) => Some(Err(PipelineError::decode(&self.path, e.to_string()))),
        }
    }
}

impl Iterator for RawFrames {
    type Item = PipelineResult<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let frame_len = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; frame_len];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return self.finish(),
            Err(e) => {
                self.finished = true;
                return Some(Err(PipelineError::decode(&self.path, e.to_string())));
            }
        }
        let pts = self.next_pts();
        let Some(image) = RgbImage::from_raw(self.width, self.height, buf) else {
            self.finished = true;
            return Some(Err(PipelineError::decode(&self.path, "short frame buffer")));
        };
        let image = match self.quarter_turns {
            1 => imageops::rotate90(&image),
            2 => imageops::rotate180(&image),
            3 => imageops::rotate270(&image),
            _ => image,
        };
        Some(Ok(DecodedFrame { pts, image }))
    }
}

impl Drop for RawFrames {
    fn drop(&mut self) {
        // Sampling usually stops early; don't leave ffmpeg writing to a closed pipe.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    time_base: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug)]
struct ProbedStream {
    /// Dimensions as displayed, after rotation.
    info: StreamInfo,
    coded_width: u32,
    coded_height: u32,
    /// Clockwise quarter turns needed to display a coded frame upright.
    quarter_turns: u8,
}

/// Clockwise display rotation in quarter turns. The display matrix reports
/// counter-clockwise degrees; the legacy `rotate` tag reports clockwise ones.
fn quarter_turns(stream: &ProbeStream) -> u8 {
    let clockwise = stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .map(|ccw| -ccw)
        .or_else(|| {
            stream
                .tags
                .as_ref()
                .and_then(|t| t.rotate.as_deref())
                .and_then(|r| r.trim().parse::<f64>().ok())
        })
        .unwrap_or(0.0);
    ((clockwise / 90.0).round() as i64).rem_euclid(4) as u8
}

fn parse_probe(stdout: &[u8]) -> Result<ProbedStream, String> {
    let probe: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| format!("unreadable ffprobe output: {}", e))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no decodable video track".to_string())?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video track has no frame size".to_string()),
    };
    let time_base = stream
        .time_base
        .as_deref()
        .and_then(TimeBase::parse)
        .ok_or_else(|| "video track has no time base".to_string())?;
    let turns = quarter_turns(&stream);

    // Matroska/WebM streams often only report a container duration.
    let duration_secs = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .and_then(|f| f.duration)
                .and_then(|d| d.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    let (display_width, display_height) = if turns % 2 == 1 {
        (height, width)
    } else {
        (width, height)
    };
    Ok(ProbedStream {
        info: StreamInfo {
            duration_secs,
            time_base,
            width: display_width,
            height: display_height,
        },
        coded_width: width,
        coded_height: height,
        quarter_turns: turns,
    })
}

/// Reads the `pts:` field of a `showinfo` frame line. `Some(None)` is a frame
/// logged without a timestamp; `None` is any other log line.
fn parse_showinfo_pts(line: &str) -> Option<Option<i64>> {
    if !line.contains("Parsed_showinfo") {
        return None;
    }
    let start = line.find(" pts:")? + " pts:".len();
    let value = line[start..].split_whitespace().next().unwrap_or_default();
    Some(value.parse::<i64>().ok())
}
