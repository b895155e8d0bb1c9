//! Publishing of cycle results for telemetry consumers.

use crate::error::SinkError;
use chrono::{DateTime, Utc};
use gemma3n_core::MediaKind;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

pub const ERROR_TOPIC: &str = "gemma3n.error";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishRecord {
    pub topic: String,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, Value>,
}

impl PublishRecord {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

pub trait PublishSink: Send + Sync {
    fn publish(&self, record: &PublishRecord) -> Result<(), SinkError>;
}

/// Emits records as structured log events.
#[derive(Debug, Default)]
pub struct LogSink;

impl PublishSink for LogSink {
    fn publish(&self, record: &PublishRecord) -> Result<(), SinkError> {
        let metadata = serde_json::to_string(&record.metadata)?;
        info!(
            topic = %record.topic,
            timestamp = %record.timestamp.to_rfc3339(),
            metadata = %metadata,
            payload = %record.payload,
            "publish"
        );
        Ok(())
    }
}

/// Appends one JSON object per record to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PublishSink for JsonLinesSink {
    fn publish(&self, record: &PublishRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Publishes every record, logging sink failures instead of returning them.
pub fn publish_all(sink: &dyn PublishSink, records: &[PublishRecord]) {
    for record in records {
        if let Err(e) = sink.publish(record) {
            warn!(topic = %record.topic, error = %e, "publish failed");
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// The `<task>.result` record plus one record per file when several were used.
pub fn result_records(
    task: &str,
    reply: &str,
    files: &[(MediaKind, PathBuf)],
    model: &str,
    event: Option<&str>,
) -> Vec<PublishRecord> {
    let modes: Vec<&str> = files.iter().map(|(kind, _)| kind.as_str()).collect();
    let names: Vec<String> = files.iter().map(|(_, path)| file_name(path)).collect();
    let summary = PublishRecord::new(format!("gemma3n.{}.result", task), reply)
        .with_meta("modes", json!(modes))
        .with_meta("files", json!(names))
        .with_meta("model", json!(model))
        .with_meta("event_description", json!(event));
    let timestamp = summary.timestamp;

    let mut records = vec![summary];
    if files.len() > 1 {
        for (kind, path) in files {
            let mut record = PublishRecord::new(format!("gemma3n.{}.{}", task, kind), reply)
                .with_meta("file", json!(file_name(path)))
                .with_meta("mode", json!(kind.as_str()));
            record.timestamp = timestamp;
            records.push(record);
        }
    }
    records
}

pub fn error_record(task: &str, modes: &[MediaKind], error: &str) -> PublishRecord {
    let modes: Vec<&str> = modes.iter().map(MediaKind::as_str).collect();
    PublishRecord::new(ERROR_TOPIC, error)
        .with_meta("modes", json!(modes))
        .with_meta("task", json!(task))
}
