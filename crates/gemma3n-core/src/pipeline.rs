//! One prompt-to-reply dispatch: persist inputs, normalize, generate, release.

use crate::backend::BackendHandle;
use crate::error::{PipelineError, PipelineResult};
use crate::media::extension_of;
use crate::message::{CanonicalMessage, GenerationRequest};
use crate::normalize::ContentNormalizer;
use crate::scratch::{ScratchScope, ScratchSpace};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Media handed to a dispatch.
#[derive(Debug, Clone)]
pub enum RawMedia {
    /// Uploaded bytes. Persisted to scratch storage for the dispatch and
    /// removed afterwards; `file_name` supplies the extension.
    Upload { file_name: String, bytes: Vec<u8> },
    /// A file already on disk. Read in place and never deleted.
    Local(PathBuf),
}

impl RawMedia {
    pub fn upload(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        RawMedia::Upload {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        RawMedia::Local(path.into())
    }

    /// Name used in logs and published metadata.
    pub fn display_name(&self) -> String {
        match self {
            RawMedia::Upload { file_name, .. } => file_name.clone(),
            RawMedia::Local(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub system_text: String,
    pub user_text: String,
    pub media: Vec<RawMedia>,
    pub max_tokens: u32,
}

impl DispatchRequest {
    pub fn new(system_text: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system_text: system_text.into(),
            user_text: String::new(),
            media: Vec::new(),
            max_tokens,
        }
    }

    pub fn with_user_text(mut self, user_text: impl Into<String>) -> Self {
        self.user_text = user_text.into();
        self
    }

    pub fn with_media(mut self, media: RawMedia) -> Self {
        self.media.push(media);
        self
    }
}

/// Shared by every dispatch in the process; each call gets its own scratch scope.
#[derive(Clone)]
pub struct DispatchPipeline {
    scratch: ScratchSpace,
    normalizer: Arc<ContentNormalizer>,
    backend: BackendHandle,
}

impl DispatchPipeline {
    pub fn new(
        scratch: ScratchSpace,
        normalizer: ContentNormalizer,
        backend: BackendHandle,
    ) -> Self {
        Self {
            scratch,
            normalizer: Arc::new(normalizer),
            backend,
        }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Runs the dispatch and returns the generated text.
    ///
    /// Scratch resources are released before this returns, whatever the
    /// outcome. If the future is dropped mid-flight, the scope's `Drop` (or
    /// the blocking task's, once it finishes) releases them instead.
    pub async fn run(&self, request: DispatchRequest) -> PipelineResult<String> {
        let started = Instant::now();
        let max_tokens = NonZeroU32::new(request.max_tokens)
            .ok_or(PipelineError::InvalidTokenBudget(request.max_tokens))?;
        let inputs = request.media.len();

        let mut scope = self.scratch.scope();
        let normalizer = Arc::clone(&self.normalizer);
        let DispatchRequest {
            system_text,
            user_text,
            media,
            ..
        } = request;

        // Decoding and file writes block; keep them off the async workers.
        let (mut scope, messages) = tokio::task::spawn_blocking(move || {
            let result = prepare(&normalizer, &system_text, &user_text, &media, &mut scope);
            (scope, result)
        })
        .await
        .map_err(|e| PipelineError::Aborted(e.to_string()))?;

        let outcome = match messages {
            Ok(messages) => {
                let parts = messages.iter().map(|m| m.parts().len()).sum::<usize>();
                debug!(parts, scratch = scope.live().len(), "normalized request");
                let request = GenerationRequest::new(messages, max_tokens);
                self.backend.generate(&request).await.map_err(PipelineError::from)
            }
            Err(e) => Err(e),
        };
        scope.release_all();

        match &outcome {
            Ok(reply) => info!(
                backend = self.backend.name(),
                inputs,
                reply_chars = reply.chars().count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dispatch complete"
            ),
            Err(e) => info!(
                backend = self.backend.name(),
                inputs,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dispatch failed"
            ),
        }
        outcome
    }
}

/// Persists uploads into `scope`, then normalizes.
fn prepare(
    normalizer: &ContentNormalizer,
    system_text: &str,
    user_text: &str,
    media: &[RawMedia],
    scope: &mut ScratchScope,
) -> PipelineResult<Vec<CanonicalMessage>> {
    let mut paths = Vec::with_capacity(media.len());
    for item in media {
        match item {
            RawMedia::Upload { file_name, bytes } => {
                let suffix = extension_of(Path::new(file_name)).unwrap_or_default();
                let handle = scope.acquire(bytes, &suffix)?;
                paths.push(handle.path().to_path_buf());
            }
            RawMedia::Local(path) => paths.push(path.clone()),
        }
    }
    normalizer.normalize(system_text, user_text, &paths, scope)
}
