//! File-type classification for uploaded and local media.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm"];

/// The category a media file falls into, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    /// Classifies a path by its extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<MediaKind> {
        let extension = extension_of(path)?;
        Self::from_extension(&extension)
    }

    pub fn from_extension(extension: &str) -> Option<MediaKind> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Image)
        } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Audio)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-cased extension without the leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// MIME type for a supported extension, `application/octet-stream` otherwise.
pub fn mime_type_of(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classifies_by_extension_case_insensitively() {
        assert_eq!(MediaKind::from_path(Path::new("cat.JPG")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("a/b/clip.Mp4")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("song.ogg")), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_extension(".webm"), Some(MediaKind::Video));
    }

    #[test]
    fn unknown_or_missing_extensions_are_unclassified() {
        assert_eq!(MediaKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaKind::from_path(&PathBuf::from("no_extension")), None);
        assert_eq!(MediaKind::from_path(Path::new("archive.tar.gz")), None);
    }

    #[test]
    fn mime_types_follow_the_tables() {
        assert_eq!(mime_type_of(Path::new("x.jpeg")), "image/jpeg");
        assert_eq!(mime_type_of(Path::new("x.mp3")), "audio/mpeg");
        assert_eq!(mime_type_of(Path::new("x.mov")), "video/quicktime");
        assert_eq!(mime_type_of(Path::new("x.bin")), "application/octet-stream");
    }
}
