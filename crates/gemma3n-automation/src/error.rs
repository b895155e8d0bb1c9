use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to fetch config from {url}: {message}")]
    ConfigFetch { url: String, message: String },

    #[error("unparseable config document: {0}")]
    ConfigParse(String),
}

/// A publish sink could not accept a record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}
