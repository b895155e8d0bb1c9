//! Buffered multipart forms.

use crate::error::{ApiError, ApiResult};
use axum::extract::Multipart;
use gemma3n_core::{MediaKind, RawMedia};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Upload {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_path(std::path::Path::new(&self.file_name))
    }

    pub fn into_media(self) -> RawMedia {
        RawMedia::upload(self.file_name, self.bytes)
    }
}

/// Text fields by name plus file parts in arrival order.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    uploads: Vec<Upload>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await?;
                    form.uploads.push(Upload {
                        field: name,
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn required_text(&self, name: &str) -> ApiResult<&str> {
        match self.fields.get(name).map(|v| v.trim()) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ApiError::BadRequest(format!("missing form field '{}'", name))),
        }
    }

    /// Parses `max_new_tokens`, falling back to the route default.
    pub fn max_tokens(&self, default: u32) -> ApiResult<u32> {
        match self.fields.get("max_new_tokens").map(|v| v.trim()) {
            None | Some("") => Ok(default),
            Some(value) => value.parse().map_err(|_| {
                ApiError::BadRequest(format!("max_new_tokens must be an integer, got '{}'", value))
            }),
        }
    }

    /// Removes the upload for `field`, checking its category.
    pub fn take_file(&mut self, field: &str, kinds: &[MediaKind]) -> ApiResult<Upload> {
        let index = self
            .uploads
            .iter()
            .position(|u| u.field == field)
            .ok_or_else(|| ApiError::BadRequest(format!("missing file field '{}'", field)))?;
        let upload = self.uploads.remove(index);
        match upload.kind() {
            Some(kind) if kinds.contains(&kind) => Ok(upload),
            _ => {
                let expected: Vec<&str> = kinds.iter().map(MediaKind::as_str).collect();
                Err(ApiError::BadRequest(format!(
                    "'{}' must be a supported {} file",
                    upload.file_name,
                    expected.join(" or ")
                )))
            }
        }
    }

    /// All uploads sent under `field`, unchecked.
    pub fn take_all(&mut self, field: &str) -> Vec<Upload> {
        let (taken, rest) = std::mem::take(&mut self.uploads)
            .into_iter()
            .partition(|u| u.field == field);
        self.uploads = rest;
        taken
    }
}
