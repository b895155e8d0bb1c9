use super::GenerationBackend;
use crate::error::BackendError;
use crate::message::{ContentPart, GenerationRequest};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` over HTTP. Media parts are sent inline.
pub struct GeminiBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiBackend {
    pub fn new(endpoint: &str, model: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    fn error(&self, message: impl Into<String>) -> BackendError {
        BackendError::new("gemini", message)
    }

    async fn encode_part(&self, part: &ContentPart) -> Result<Value, BackendError> {
        match part {
            ContentPart::Text { text } => Ok(json!({ "text": text })),
            ContentPart::Image { source, metadata } | ContentPart::Audio { source, metadata } => {
                let data = tokio::fs::read(source).await.map_err(|e| {
                    self.error(format!("failed to read '{}': {}", source.display(), e))
                })?;
                Ok(json!({
                    "inline_data": {
                        "mime_type": metadata.mime_type,
                        "data": STANDARD.encode(data)
                    }
                }))
            }
        }
    }

    async fn build_body(&self, request: &GenerationRequest) -> Result<Value, BackendError> {
        let directive = request.system().map(|m| m.text()).unwrap_or_default();
        let mut parts = Vec::new();
        // Gemma models served through this API reject systemInstruction.
        let fold_directive = self.model.starts_with("gemma");
        if fold_directive && !directive.is_empty() {
            parts.push(json!({ "text": directive }));
        }
        if let Some(user) = request.user() {
            for part in user.parts() {
                parts.push(self.encode_part(part).await?);
            }
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "maxOutputTokens": request.max_tokens() }
        });
        if !fold_directive && !directive.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": directive }] });
        }
        Ok(body)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(self.error("GEMINI_API_KEY is not set")),
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| self.error("GEMINI_API_KEY is not set"))?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        );
        let body = self.build_body(request).await?;
        debug!(url = %url, max_tokens = request.max_tokens(), "sending generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.error(e.to_string()))?;
        if !status.is_success() {
            return Err(self.error(format!("API error ({}): {}", status, text)));
        }
        extract_candidate_text(&text)
            .ok_or_else(|| self.error("response contained no candidate text"))
    }
}

/// Concatenates the text parts of every candidate.
fn extract_candidate_text(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let chunks = match json {
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut text = String::new();
    for chunk in &chunks {
        let Some(candidates) = chunk.get("candidates").and_then(Value::as_array) else {
            continue;
        };
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|c| c.get("parts"))
                .and_then(Value::as_array);
            for part in parts.into_iter().flatten() {
                if let Some(t) = part.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
        }
    }
    if text.is_empty() {
        None
    } else {
        Some(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CanonicalMessage;
    use std::num::NonZeroU32;

    fn request(dir: &std::path::Path) -> GenerationRequest {
        let image = dir.join("still.png");
        std::fs::write(&image, b"\x89PNG").unwrap();
        GenerationRequest::new(
            vec![
                CanonicalMessage::system("Describe the scene."),
                CanonicalMessage::user(vec![
                    ContentPart::text("what is here?"),
                    ContentPart::image(image),
                ]),
            ],
            NonZeroU32::new(64).unwrap(),
        )
    }

    #[tokio::test]
    async fn gemma_models_fold_the_directive_into_the_user_turn() {
        let dir = tempfile::tempdir().unwrap();
        let backend = GeminiBackend::new(DEFAULT_ENDPOINT, "gemma-3n-e2b-it", Some("k".into()));
        let body = backend.build_body(&request(dir.path())).await.unwrap();

        assert!(body.get("systemInstruction").is_none());
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "Describe the scene.");
        assert_eq!(parts[1]["text"], "what is here?");
        assert_eq!(parts[2]["inline_data"]["mime_type"], "image/png");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
    }

    #[tokio::test]
    async fn gemini_models_use_system_instruction() {
        let dir = tempfile::tempdir().unwrap();
        let backend = GeminiBackend::new(DEFAULT_ENDPOINT, "gemini-2.5-flash", Some("k".into()));
        let body = backend.build_body(&request(dir.path())).await.unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Describe the scene.");
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn initialize_requires_an_api_key() {
        let backend = GeminiBackend::new(DEFAULT_ENDPOINT, "gemma-3n-e2b-it", None);
        assert!(backend.initialize().await.is_err());
    }

    #[test]
    fn candidate_text_is_concatenated() {
        let body =
            r#"{"candidates":[{"content":{"parts":[{"text":"A dog "},{"text":"barks."}]}}]}"#;
        assert_eq!(extract_candidate_text(body).as_deref(), Some("A dog barks."));
        assert_eq!(extract_candidate_text(r#"{"candidates":[]}"#), None);
    }
}
