use super::GenerationBackend;
use crate::error::BackendError;
use crate::message::{ContentPart, GenerationRequest, Role};
use async_trait::async_trait;

/// Echoes the request structure instead of calling a model.
#[derive(Debug, Default)]
pub struct DryRunBackend;

impl DryRunBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GenerationBackend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn model(&self) -> &str {
        "dry-run"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        Ok(render(request))
    }
}

fn render(request: &GenerationRequest) -> String {
    let mut lines = vec![format!("[dry-run] max_tokens={}", request.max_tokens())];
    for message in request.messages() {
        let role = match message.role() {
            Role::System => "system",
            Role::User => "user",
        };
        for part in message.parts() {
            let line = match part {
                ContentPart::Text { text } => format!("{}: text {:?}", role, text),
                ContentPart::Image { metadata, .. } | ContentPart::Audio { metadata, .. } => {
                    format!(
                        "{}: {} {}",
                        role,
                        part.label(),
                        metadata.file_name.as_deref().unwrap_or("<unnamed>")
                    )
                }
            };
            lines.push(line);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CanonicalMessage;
    use std::num::NonZeroU32;

    #[tokio::test]
    async fn renders_every_part_in_order() {
        let request = GenerationRequest::new(
            vec![
                CanonicalMessage::system("Caption."),
                CanonicalMessage::user(vec![
                    ContentPart::text("hi"),
                    ContentPart::image("/tmp/frame_0000.jpg"),
                    ContentPart::audio("/tmp/a.wav"),
                ]),
            ],
            NonZeroU32::new(5).unwrap(),
        );
        let reply = DryRunBackend::new().generate(&request).await.unwrap();
        assert_eq!(
            reply,
            "[dry-run] max_tokens=5\n\
             system: text \"Caption.\"\n\
             user: text \"hi\"\n\
             user: image frame_0000.jpg\n\
             user: audio a.wav"
        );
    }
}
