//! Fixed-period driver for the dispatch pipeline.
//!
//! Every tick fetches the configuration, resolves the requested modes to
//! media files and runs one dispatch. A failing cycle is logged and reported;
//! it never ends the loop.

use crate::config::ScheduleConfig;
use crate::publish::{error_record, publish_all, result_records, PublishSink};
use crate::resolve::MediaResolver;
use crate::source::ConfigSource;
use gemma3n_core::{DispatchPipeline, DispatchRequest, MediaKind, RawMedia};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    ConfigValid,
    ConfigInvalid,
    Dispatching,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Dispatched {
        config: ScheduleConfig,
        files: Vec<(MediaKind, PathBuf)>,
        reply: String,
        config_changed: bool,
    },
    Skipped {
        reason: String,
    },
    Failed {
        config: ScheduleConfig,
        error: String,
        config_changed: bool,
    },
}

impl CycleOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, CycleOutcome::Dispatched { .. })
    }
}

pub struct Scheduler {
    source: Box<dyn ConfigSource>,
    pipeline: DispatchPipeline,
    resolver: MediaResolver,
    sink: Option<Arc<dyn PublishSink>>,
    period: Duration,
    task: String,
    event: Option<String>,
    state: SchedulerState,
    last_config: Option<ScheduleConfig>,
}

impl Scheduler {
    pub fn new(
        source: Box<dyn ConfigSource>,
        pipeline: DispatchPipeline,
        resolver: MediaResolver,
        period: Duration,
    ) -> Self {
        Self {
            source,
            pipeline,
            resolver,
            sink: None,
            period,
            task: "dynamic".to_string(),
            event: None,
            state: SchedulerState::Idle,
            last_config: None,
        }
    }

    /// Label used in publish topics (`gemma3n.<task>.result`).
    pub fn with_task(mut self, task: impl Into<String>, event: Option<String>) -> Self {
        self.task = task.into();
        self.event = event;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn PublishSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!(from = ?self.state, to = ?next, "scheduler state");
        self.state = next;
    }

    /// Runs one fetch-resolve-dispatch cycle. Always ends back in `Idle`.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.transition(SchedulerState::Fetching);
        let config = match self.source.fetch().await {
            Ok(config) => config,
            Err(e) => {
                self.transition(SchedulerState::ConfigInvalid);
                warn!(
                    source = %self.source.describe(),
                    error = %e,
                    "no usable configuration, skipping cycle"
                );
                self.transition(SchedulerState::Idle);
                return CycleOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };
        self.transition(SchedulerState::ConfigValid);

        let config_changed = self.last_config.as_ref() != Some(&config);
        if config_changed {
            info!(interval_seconds = ?config.interval_seconds, "configuration changed");
            self.last_config = Some(config.clone());
        } else {
            info!("configuration unchanged, running scheduled cycle");
        }

        let files = self.resolver.resolve_all(&config.modes);
        if files.is_empty() {
            warn!(modes = ?config.modes, "no media files resolved, skipping cycle");
            self.transition(SchedulerState::Idle);
            return CycleOutcome::Skipped {
                reason: "no media files resolved".to_string(),
            };
        }

        self.transition(SchedulerState::Dispatching);
        let mut request = DispatchRequest::new(config.system_prompt.clone(), config.max_tokens)
            .with_user_text(config.user_prompt.clone());
        for (_, path) in &files {
            request = request.with_media(RawMedia::local(path));
        }

        let outcome = match self.pipeline.run(request).await {
            Ok(reply) => {
                if let Some(sink) = &self.sink {
                    let records = result_records(
                        &self.task,
                        &reply,
                        &files,
                        self.pipeline.backend().model(),
                        self.event.as_deref(),
                    );
                    publish_all(sink.as_ref(), &records);
                }
                CycleOutcome::Dispatched {
                    config,
                    files,
                    reply,
                    config_changed,
                }
            }
            Err(e) => {
                error!(task = %self.task, error = %e, "scheduled dispatch failed");
                if let Some(sink) = &self.sink {
                    let modes: Vec<MediaKind> = config.modes.iter().copied().collect();
                    publish_all(sink.as_ref(), &[error_record(&self.task, &modes, &e.to_string())]);
                }
                CycleOutcome::Failed {
                    config,
                    error: e.to_string(),
                    config_changed,
                }
            }
        };
        self.transition(SchedulerState::Idle);
        outcome
    }

    /// Runs cycles until `shutdown` resolves, handing each outcome to `report`.
    ///
    /// The first cycle starts immediately. A zero period runs a single cycle.
    pub async fn run<F, R>(mut self, shutdown: F, mut report: R)
    where
        F: Future<Output = ()>,
        R: FnMut(&CycleOutcome),
    {
        tokio::pin!(shutdown);

        if self.period.is_zero() {
            tokio::select! {
                outcome = self.run_cycle() => report(&outcome),
                _ = &mut shutdown => info!("shutdown requested"),
            }
            return;
        }

        info!(
            source = %self.source.describe(),
            period_secs = self.period.as_secs_f64(),
            task = %self.task,
            "scheduler started"
        );
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        outcome = self.run_cycle() => report(&outcome),
                        _ = &mut shutdown => break,
                    }
                }
            }
        }
        info!("scheduler stopped");
    }
}
