//! Fixed directives for the built-in analysis tasks.

use crate::error::{PipelineError, PipelineResult};
use crate::media::MediaKind;
use crate::message::MediaRef;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const MULTIMODAL_CAPTION: &str = "You are an expert multimodal analyst. Provide detailed, accurate captions describing the content across all provided media types.";

pub const CHANGE_DETECTION: &str = "You are an expert in image comparison and change detection. Compare these two images and identify what has changed between them. Describe any differences in objects, positions, appearances, or scenes. Be specific about what was added, removed, or modified.";

pub const AUDIO_VISION: &str = "You are an expert multimodal analyst. Analyze both the audio and visual information provided to create a comprehensive understanding of the environment and situation. Correlate information from both modalities to provide insights that wouldn't be possible from either alone. Describe the scene, events, context, and any relationships between what you hear and see.";

pub const AUDIO_VIDEO: &str = "You are an expert multimodal analyst. Analyze both the audio and video information provided to create a comprehensive understanding of the environment and situation. Correlate information from both modalities, including temporal alignment between audio and visual events. Describe the scene, events, context, and any relationships between what you hear and see over time.";

pub fn caption(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "You are an expert image analyst. Provide detailed, accurate captions describing the image content including objects, scenes, people, actions, and any notable features.",
        MediaKind::Audio => "You are an expert audio analyst. Provide detailed, accurate captions describing the audio content including sounds, speech, music, environment, and any notable events or patterns you detect.",
        MediaKind::Video => "You are an expert video analyst. Provide detailed, accurate captions describing the video content including actions, scenes, objects, people, and any notable events or patterns. Describe the temporal progression of events.",
    }
}

pub fn event_detection(kind: MediaKind, event: &str) -> String {
    let (subject, sense) = match kind {
        MediaKind::Image => ("image", "see"),
        MediaKind::Audio => ("audio", "hear"),
        MediaKind::Video => ("video", "see"),
    };
    format!(
        "You are an expert {subject} event detector. Analyze the {subject} and determine if the following event is occurring: '{event}'. Respond with 'YES' if the event is detected, 'NO' if it's not detected, followed by a brief explanation of what you {sense}."
    )
}

/// Longer form used when the frames of an uploaded clip are analysed directly.
pub fn video_frames_event_detection(event: &str) -> String {
    format!(
        "You are an expert video event detector. Analyze the video frames and determine if the following event is occurring: '{event}'. Respond with 'YES' if the event is detected, 'NO' if it's not detected, followed by a detailed explanation of what you see in the video and when/where the event occurs if detected."
    )
}

pub fn multimodal_event_detection(event: &str) -> String {
    format!(
        "You are an expert multimodal event detector. Analyze all provided media and determine if the following event is occurring: '{event}'. Respond with 'YES' if detected, 'NO' if not, followed by explanation."
    )
}

pub fn classification(categories: &str) -> String {
    let categories = categories.trim();
    if categories.is_empty() {
        "You are an expert image classifier. Analyze this image and provide a detailed classification including the main subject, scene type, and any notable features.".to_string()
    } else {
        format!(
            "You are an expert image classifier. Classify this image into one of the following categories: {categories}. Respond with the most appropriate category and a brief explanation."
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Caption,
    Detect,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Caption => "caption",
            Task::Detect => "detect",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "caption" => Ok(Task::Caption),
            "detect" => Ok(Task::Detect),
            other => Err(format!("unknown task '{}', expected caption or detect", other)),
        }
    }
}

/// Directive and user text chosen for a task over a set of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPlan {
    pub task: Task,
    pub system_text: String,
    pub user_text: String,
    pub files: Vec<PathBuf>,
}

impl TaskPlan {
    /// One file gets its kind-specific directive; several get the multimodal
    /// one. Single-file detection sends the media alone.
    pub fn build(
        task: Task,
        files: Vec<PathBuf>,
        user_text: &str,
        event: Option<&str>,
    ) -> PipelineResult<TaskPlan> {
        let single_kind = match files.as_slice() {
            [only] => Some(MediaRef::classify(only.clone())?.kind),
            _ => None,
        };

        let (system_text, user_text) = match task {
            Task::Caption => {
                let directive = match single_kind {
                    Some(kind) => caption(kind).to_string(),
                    None => MULTIMODAL_CAPTION.to_string(),
                };
                (directive, user_text.to_string())
            }
            Task::Detect => {
                let event = event
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .ok_or(PipelineError::EmptyDirective)?;
                match single_kind {
                    Some(kind) => (event_detection(kind, event), String::new()),
                    None => (multimodal_event_detection(event), user_text.to_string()),
                }
            }
        };

        Ok(TaskPlan {
            task,
            system_text,
            user_text,
            files,
        })
    }
}
