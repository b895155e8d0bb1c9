//! The generation backend seam.
//!
//! The pipeline only needs "messages and a token budget in, text out". Model
//! loading, tokenization and decoding live behind [`GenerationBackend`].

mod dry_run;
mod gemini;
mod ollama;

pub use dry_run::DryRunBackend;
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;

use crate::error::BackendError;
use crate::message::GenerationRequest;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Model identifier reported in logs and published metadata.
    fn model(&self) -> &str;

    /// One-time preparation, e.g. checking that the model is reachable.
    async fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError>;
}

/// Lifecycle wrapper around a backend, shared by every dispatch.
///
/// The backend is initialized at most once, lazily on first use unless
/// [`BackendHandle::initialize`] is called up front.
#[derive(Clone)]
pub struct BackendHandle {
    backend: Arc<dyn GenerationBackend>,
    ready: Arc<OnceCell<()>>,
}

impl BackendHandle {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            ready: Arc::new(OnceCell::new()),
        }
    }

    pub async fn initialize(&self) -> Result<(), BackendError> {
        self.ready
            .get_or_try_init(|| async {
                self.backend.initialize().await?;
                info!(backend = self.backend.name(), model = self.backend.model(), "backend ready");
                Ok::<(), BackendError>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        self.initialize().await?;
        self.backend.generate(request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Gemini,
    DryRun,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Ollama => "gemma3n:e2b",
            Provider::Gemini => "gemma-3n-e2b-it",
            Provider::DryRun => "dry-run",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "gemini" | "google" => Ok(Provider::Gemini),
            "dry-run" | "dryrun" | "none" => Ok(Provider::DryRun),
            other => Err(format!(
                "unknown provider '{}', expected one of: ollama, gemini, dry-run",
                other
            )),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Ollama => "ollama",
            Provider::Gemini => "gemini",
            Provider::DryRun => "dry-run",
        })
    }
}

/// How to reach the model.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub provider: Provider,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl BackendConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            model: None,
            endpoint: None,
            api_key: None,
        }
    }

    pub fn build(&self) -> BackendHandle {
        let model = self
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());
        let backend: Arc<dyn GenerationBackend> = match self.provider {
            Provider::Ollama => Arc::new(OllamaBackend::new(
                self.endpoint.as_deref().unwrap_or(ollama::DEFAULT_ENDPOINT),
                model,
            )),
            Provider::Gemini => Arc::new(GeminiBackend::new(
                self.endpoint.as_deref().unwrap_or(gemini::DEFAULT_ENDPOINT),
                model,
                self.api_key.clone(),
            )),
            Provider::DryRun => Arc::new(DryRunBackend::new()),
        };
        BackendHandle::new(backend)
    }
}
