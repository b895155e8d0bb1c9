//! Scratch storage for uploaded bytes and derived artifacts.
//!
//! A [`ScratchSpace`] is a root directory shared by the process. Each dispatch
//! opens its own [`ScratchScope`]; everything acquired through the scope is
//! removed when the scope is released or dropped, so early returns, errors,
//! panics and cancelled futures all clean up.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchKind {
    File,
    Directory,
}

/// An acquired scratch file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchHandle {
    path: PathBuf,
    kind: ScratchKind,
}

impl ScratchHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ScratchKind {
        self.kind
    }

    /// Deletes the underlying file or directory tree.
    ///
    /// Releasing twice, or releasing a path that is already gone, succeeds.
    pub fn release(&self) -> io::Result<()> {
        let result = match self.kind {
            ScratchKind::File => fs::remove_file(&self.path),
            ScratchKind::Directory => fs::remove_dir_all(&self.path),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Root directory under which scopes allocate.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    /// Uses `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// A scratch space under the OS temp directory.
    pub fn system() -> io::Result<Self> {
        Self::new(std::env::temp_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope(&self) -> ScratchScope {
        ScratchScope {
            root: self.root.clone(),
            live: Vec::new(),
        }
    }
}

/// Scratch resources owned by a single dispatch.
#[derive(Debug)]
pub struct ScratchScope {
    root: PathBuf,
    live: Vec<ScratchHandle>,
}

impl ScratchScope {
    /// Writes `bytes` to a freshly named file. `suffix_hint` (e.g. `.mp4`)
    /// keeps the extension so the file can still be classified.
    pub fn acquire(&mut self, bytes: &[u8], suffix_hint: &str) -> io::Result<ScratchHandle> {
        let suffix = normalize_suffix(suffix_hint);
        let mut file = Builder::new()
            .prefix("upload_")
            .suffix(&suffix)
            .tempfile_in(&self.root)?;
        file.write_all(bytes)?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;

        let handle = ScratchHandle {
            path,
            kind: ScratchKind::File,
        };
        debug!(path = %handle.path.display(), bytes = bytes.len(), "acquired scratch file");
        self.live.push(handle.clone());
        Ok(handle)
    }

    /// Allocates an empty scratch directory.
    pub fn acquire_directory(&mut self, prefix_hint: &str) -> io::Result<ScratchHandle> {
        let path = Builder::new()
            .prefix(prefix_hint)
            .tempdir_in(&self.root)?
            .keep();

        let handle = ScratchHandle {
            path,
            kind: ScratchKind::Directory,
        };
        debug!(path = %handle.path.display(), "acquired scratch directory");
        self.live.push(handle.clone());
        Ok(handle)
    }

    /// Releases one handle and stops tracking it.
    pub fn release(&mut self, handle: &ScratchHandle) -> io::Result<()> {
        self.live.retain(|h| h != handle);
        handle.release()
    }

    /// Releases everything still held, newest first so frame directories go
    /// before the uploads they were derived from.
    pub fn release_all(&mut self) {
        while let Some(handle) = self.live.pop() {
            if let Err(e) = handle.release() {
                warn!(
                    path = %handle.path.display(),
                    error = %e,
                    "failed to release scratch resource"
                );
            }
        }
    }

    pub fn live(&self) -> &[ScratchHandle] {
        &self.live
    }
}

impl Drop for ScratchScope {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn normalize_suffix(hint: &str) -> String {
    let hint = hint.trim();
    if hint.is_empty() || hint.starts_with('.') {
        hint.to_string()
    } else {
        format!(".{}", hint)
    }
}
