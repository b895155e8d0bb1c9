pub mod config;
pub mod error;
pub mod publish;
pub mod resolve;
pub mod scheduler;
pub mod source;

pub use config::{parse_document, ScheduleConfig};
pub use error::{ScheduleError, SinkError};
pub use publish::{JsonLinesSink, LogSink, PublishRecord, PublishSink};
pub use resolve::MediaResolver;
pub use scheduler::{CycleOutcome, Scheduler, SchedulerState};
pub use source::{ConfigSource, FixedConfigSource, RemoteConfigSource};
