//! Remote schedule documents.
//!
//! Two layouts are accepted. The structured one is YAML (or JSON):
//!
//! ```yaml
//! system_prompt: You are a wildlife monitor.
//! user_prompt: Is there a deer?
//! modes: [image, audio]
//! max_new_tokens: 120
//! interval_seconds: 300
//! ```
//!
//! Anything that does not deserialize into that shape is read as exactly
//! three lines: the directive, a mode keyword, and the user text.

use crate::error::ScheduleError;
use gemma3n_core::MediaKind;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub const DEFAULT_MAX_TOKENS: u32 = 200;
pub const FALLBACK_MAX_TOKENS: u32 = 50;

/// One cycle's worth of instructions. Compared by value between cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub system_prompt: String,
    pub user_prompt: String,
    pub modes: BTreeSet<MediaKind>,
    pub max_tokens: u32,
    /// Reported by the document; logged but does not change the cadence.
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    system_prompt: String,
    #[serde(default)]
    user_prompt: String,
    #[serde(default)]
    modes: Vec<String>,
    #[serde(default = "default_max_tokens", alias = "max_tokens")]
    max_new_tokens: u32,
    #[serde(default)]
    interval_seconds: Option<u64>,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Parses a fetched document, structured form first.
pub fn parse_document(text: &str) -> Result<ScheduleConfig, ScheduleError> {
    match serde_yaml::from_str::<RawDocument>(text) {
        Ok(raw) => Ok(ScheduleConfig {
            system_prompt: raw.system_prompt,
            user_prompt: raw.user_prompt,
            modes: parse_modes(raw.modes.iter().map(String::as_str)),
            max_tokens: raw.max_new_tokens,
            interval_seconds: raw.interval_seconds,
        }),
        Err(structured) => {
            debug!(error = %structured, "not a structured config, trying three-line form");
            parse_three_lines(text)
                .ok_or_else(|| ScheduleError::ConfigParse(structured.to_string()))
        }
    }
}

fn parse_three_lines(text: &str) -> Option<ScheduleConfig> {
    let lines: Vec<&str> = text.trim().lines().collect();
    let [system, mode, user] = lines.as_slice() else {
        return None;
    };
    Some(ScheduleConfig {
        system_prompt: system.trim().to_string(),
        user_prompt: user.trim().to_string(),
        modes: parse_modes([mode.trim()]),
        max_tokens: FALLBACK_MAX_TOKENS,
        interval_seconds: None,
    })
}

/// Maps mode keywords to media kinds. `text` names no media.
pub fn parse_modes<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<MediaKind> {
    let mut modes = BTreeSet::new();
    for name in names {
        match name.trim().to_ascii_lowercase().as_str() {
            "image" => {
                modes.insert(MediaKind::Image);
            }
            "audio" => {
                modes.insert(MediaKind::Audio);
            }
            "video" => {
                modes.insert(MediaKind::Video);
            }
            "text" => {}
            other => warn!(mode = other, "ignoring unknown mode"),
        }
    }
    modes
}
