//! Error types shared by the media pipeline and the generation backends.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a generation backend.
#[derive(Debug, Clone, Error)]
#[error("backend '{backend}' failed: {message}")]
pub struct BackendError {
    pub backend: String,
    pub message: String,
}

impl BackendError {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Everything that can go wrong during one dispatch.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The video could not be opened or has no decodable video track.
    #[error("failed to decode media '{}': {reason}", path.display())]
    MediaDecode { path: PathBuf, reason: String },

    /// The file extension is outside the image, audio and video tables.
    #[error("unsupported file type '{extension}' for '{}'", path.display())]
    UnsupportedMedia { path: PathBuf, extension: String },

    /// A generation was requested without a system directive.
    #[error("system directive must not be blank")]
    EmptyDirective,

    #[error("max tokens must be a positive integer, got {0}")]
    InvalidTokenBudget(u32),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Scratch storage could not be written.
    #[error("scratch storage error: {0}")]
    Scratch(#[from] io::Error),

    /// The blocking media stage stopped before producing a result.
    #[error("media stage aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::MediaDecode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller's input rather than by the
    /// media stack or the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::UnsupportedMedia { .. }
                | PipelineError::EmptyDirective
                | PipelineError::InvalidTokenBudget(_)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
