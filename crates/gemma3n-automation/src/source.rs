use crate::config::{parse_document, ScheduleConfig};
use crate::error::ScheduleError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Where a scheduler gets its per-cycle configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<ScheduleConfig, ScheduleError>;
}

/// Fetches a document over HTTP on every call.
pub struct RemoteConfigSource {
    url: String,
    client: reqwest::Client,
}

impl RemoteConfigSource {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }

    fn fetch_error(&self, message: impl ToString) -> ScheduleError {
        ScheduleError::ConfigFetch {
            url: self.url.clone(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ConfigSource for RemoteConfigSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<ScheduleConfig, ScheduleError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.fetch_error(e))?
            .error_for_status()
            .map_err(|e| self.fetch_error(e))?
            .text()
            .await
            .map_err(|e| self.fetch_error(e))?;
        debug!(url = %self.url, bytes = body.len(), "fetched config");
        parse_document(&body)
    }
}

/// The same configuration every cycle, for the fixed caption/detect runs.
pub struct FixedConfigSource {
    config: ScheduleConfig,
}

impl FixedConfigSource {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigSource for FixedConfigSource {
    fn describe(&self) -> String {
        "fixed".to_string()
    }

    async fn fetch(&self) -> Result<ScheduleConfig, ScheduleError> {
        Ok(self.config.clone())
    }
}
