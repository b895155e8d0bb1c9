use gemma3n_core::MediaKind;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_SEARCH_DIRS: &[&str] = &[".", "assets", "data"];

/// Default file name looked up for each mode.
pub fn default_file(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image.jpg",
        MediaKind::Audio => "audio.mp3",
        MediaKind::Video => "video.mp4",
    }
}

/// Maps modes to the default media file found in the search directories.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    search_dirs: Vec<PathBuf>,
}

impl Default for MediaResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_DIRS.iter().map(PathBuf::from))
    }
}

impl MediaResolver {
    pub fn new(search_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_dirs: search_dirs.into_iter().collect(),
        }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// First existing `<dir>/<default file>` in search order.
    pub fn resolve(&self, kind: MediaKind) -> Option<PathBuf> {
        let name = default_file(kind);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Resolves each mode, logging the ones with no file.
    pub fn resolve_all(&self, modes: &BTreeSet<MediaKind>) -> Vec<(MediaKind, PathBuf)> {
        let mut found = Vec::with_capacity(modes.len());
        for &kind in modes {
            match self.resolve(kind) {
                Some(path) => {
                    info!(mode = %kind, file = %path.display(), "using media file");
                    found.push((kind, path));
                }
                None => warn!(mode = %kind, file = default_file(kind), "media file not found"),
            }
        }
        found
    }
}
