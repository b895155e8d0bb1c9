//! Builds the canonical `[System, User]` message pair from caller input.

use crate::error::{PipelineError, PipelineResult};
use crate::media::MediaKind;
use crate::message::{CanonicalMessage, ContentPart, MediaRef};
use crate::sampler::FrameSampler;
use crate::scratch::ScratchScope;
use std::path::PathBuf;
use tracing::debug;

pub struct ContentNormalizer {
    sampler: FrameSampler,
}

impl ContentNormalizer {
    pub fn new(sampler: FrameSampler) -> Self {
        Self { sampler }
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    /// Returns exactly two messages, system then user.
    ///
    /// The user message starts with `user_text` when it is non-empty, followed
    /// by the media in caller order. Each video is replaced in place by its
    /// sampled frames; extracted frames are written into `scope`.
    pub fn normalize(
        &self,
        system_text: &str,
        user_text: &str,
        media: &[PathBuf],
        scope: &mut ScratchScope,
    ) -> PipelineResult<Vec<CanonicalMessage>> {
        if system_text.trim().is_empty() {
            return Err(PipelineError::EmptyDirective);
        }

        let refs = media
            .iter()
            .cloned()
            .map(MediaRef::classify)
            .collect::<PipelineResult<Vec<_>>>()?;

        let mut parts = Vec::with_capacity(refs.len() + 1);
        if !user_text.is_empty() {
            parts.push(ContentPart::text(user_text));
        }

        match refs.as_slice() {
            [single] if single.kind == MediaKind::Video => {
                debug!(video = %single.path.display(), "single video input, expanding frames");
                let frames = self.sampler.sample(&single.path, scope)?;
                parts.extend(frames.into_parts());
            }
            _ => {
                for media in refs {
                    match media.kind {
                        MediaKind::Image => parts.push(ContentPart::image(media.path)),
                        MediaKind::Audio => parts.push(ContentPart::audio(media.path)),
                        MediaKind::Video => {
                            let frames = self.sampler.sample(&media.path, scope)?;
                            parts.extend(frames.into_parts());
                        }
                    }
                }
            }
        }

        Ok(vec![
            CanonicalMessage::system(system_text),
            CanonicalMessage::user(parts),
        ])
    }
}
