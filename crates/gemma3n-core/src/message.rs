use crate::error::PipelineError;
use crate::media::{extension_of, mime_type_of, MediaKind};
use serde::Serialize;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

/// A classified media file supplied by the caller.
///
/// Videos only exist at this level; they are expanded into image parts before
/// a [`CanonicalMessage`] is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub path: PathBuf,
}

impl MediaRef {
    /// Classifies `path` by extension.
    pub fn classify(path: impl Into<PathBuf>) -> Result<MediaRef, PipelineError> {
        let path = path.into();
        match MediaKind::from_path(&path) {
            Some(kind) => Ok(MediaRef { kind, path }),
            None => Err(PipelineError::UnsupportedMedia {
                extension: extension_of(&path).unwrap_or_default(),
                path,
            }),
        }
    }
}

/// Metadata describing a media part.
/// Backends that inline media need the MIME type for their payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaMetadata {
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl MediaMetadata {
    pub fn for_path(path: &Path) -> Self {
        Self {
            mime_type: mime_type_of(path).to_string(),
            file_name: path
                .file_name()
                .map(|s| s.to_string_lossy().to_string()),
        }
    }
}

/// One piece of model context. There is deliberately no video variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Image { source: PathBuf, metadata: MediaMetadata },
    Audio { source: PathBuf, metadata: MediaMetadata },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let metadata = MediaMetadata::for_path(&source);
        ContentPart::Image { source, metadata }
    }

    pub fn audio(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let metadata = MediaMetadata::for_path(&source);
        ContentPart::Audio { source, metadata }
    }

    /// Short tag used in logs and in published metadata.
    pub fn label(&self) -> &'static str {
        match self {
            ContentPart::Text { .. } => "text",
            ContentPart::Image { .. } => "image",
            ContentPart::Audio { .. } => "audio",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        match self {
            ContentPart::Image { source, .. } | ContentPart::Audio { source, .. } => Some(source),
            ContentPart::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A role-tagged turn of model input. Part order is model context order.
///
/// Fields are private so that a system message can only ever hold text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalMessage {
    role: Role,
    parts: Vec<ContentPart>,
}

impl CanonicalMessage {
    pub fn system(directive: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![ContentPart::text(directive)],
        }
    }

    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    /// All text parts joined with blank lines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// What a generation backend receives. Built fresh for every dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    messages: Vec<CanonicalMessage>,
    max_tokens: NonZeroU32,
}

impl GenerationRequest {
    pub fn new(messages: Vec<CanonicalMessage>, max_tokens: NonZeroU32) -> Self {
        Self {
            messages,
            max_tokens,
        }
    }

    pub fn messages(&self) -> &[CanonicalMessage] {
        &self.messages
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.get()
    }

    pub fn system(&self) -> Option<&CanonicalMessage> {
        self.messages.iter().find(|m| m.role() == Role::System)
    }

    pub fn user(&self) -> Option<&CanonicalMessage> {
        self.messages.iter().find(|m| m.role() == Role::User)
    }
}
