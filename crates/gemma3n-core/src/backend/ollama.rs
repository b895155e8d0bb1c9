use super::GenerationBackend;
use crate::error::BackendError;
use crate::message::{ContentPart, GenerationRequest, Role};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// A local Ollama server's `/api/chat` endpoint.
pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaBackend {
    pub fn new(endpoint: &str, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> BackendError {
        BackendError::new("ollama", message)
    }

    async fn build_messages(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ChatMessage>, BackendError> {
        let mut messages = Vec::with_capacity(request.messages().len());
        for message in request.messages() {
            let role = match message.role() {
                Role::System => "system",
                Role::User => "user",
            };
            let mut images = Vec::new();
            for part in message.parts() {
                match part {
                    ContentPart::Text { .. } => {}
                    ContentPart::Image { source, .. } => {
                        let data = tokio::fs::read(source).await.map_err(|e| {
                            self.error(format!("failed to read '{}': {}", source.display(), e))
                        })?;
                        images.push(STANDARD.encode(data));
                    }
                    ContentPart::Audio { source, .. } => {
                        return Err(self.error(format!(
                            "audio input is not supported by the chat API ('{}')",
                            source.display()
                        )));
                    }
                }
            }
            messages.push(ChatMessage {
                role,
                content: message.text(),
                images,
            });
        }
        Ok(messages)
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        let url = format!("{}/api/tags", self.endpoint);
        let tags: TagsResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.error(format!("server unreachable at {}: {}", self.endpoint, e)))?
            .error_for_status()
            .map_err(|e| self.error(e.to_string()))?
            .json()
            .await
            .map_err(|e| self.error(e.to_string()))?;
        if tags.models.iter().any(|m| m.name == self.model) {
            Ok(())
        } else {
            Err(self.error(format!(
                "model '{}' is not pulled, run `ollama pull {}`",
                self.model, self.model
            )))
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: self.build_messages(request).await?,
            stream: false,
            options: ChatOptions {
                num_predict: request.max_tokens(),
            },
        };
        let url = format!("{}/api/chat", self.endpoint);
        debug!(url = %url, max_tokens = request.max_tokens(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.error(format!("API error ({}): {}", status, text)));
        }
        let chat: ChatResponse = response.json().await.map_err(|e| self.error(e.to_string()))?;
        Ok(chat.message.content.trim().to_string())
    }
}
