use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gemma3n_automation::resolve::default_file;
use gemma3n_automation::{
    CycleOutcome, FixedConfigSource, JsonLinesSink, LogSink, MediaResolver, PublishSink,
    RemoteConfigSource, ScheduleConfig, Scheduler,
};
use gemma3n_core::ffmpeg::FfmpegDecoder;
use gemma3n_core::tasks::{Task, TaskPlan};
use gemma3n_core::{
    BackendConfig, ContentNormalizer, DispatchPipeline, FrameSampler, MediaKind, Provider,
    SamplingConfig, ScratchSpace,
};
use gemma3n_server::AppState;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod report;

#[derive(Parser)]
#[command(author, version, about = "Multimodal prompt pipeline for Gemma 3n", long_about = None)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct RuntimeArgs {
    /// Frames sampled per second of video
    #[arg(
        long,
        global = true,
        env = "TARGET_FPS",
        default_value_t = 3.0,
        value_parser = positive_fps
    )]
    target_fps: f64,
    /// Upper bound on frames taken from one video
    #[arg(long, global = true, env = "MAX_FRAMES", default_value_t = 30)]
    max_frames: usize,
    /// Directory for uploads and extracted frames
    #[arg(long, global = true, env = "GEMMA3N_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
    /// Generation backend: ollama, gemini or dry-run
    #[arg(long, global = true, env = "GEMMA3N_PROVIDER", default_value = "ollama")]
    provider: Provider,
    /// Model name passed to the backend
    #[arg(long, global = true, env = "IMG_MODEL")]
    model: Option<String>,
    /// Base URL of the backend
    #[arg(long, global = true, env = "GEMMA3N_ENDPOINT")]
    endpoint: Option<String>,
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true, hide = true)]
    gemini_api_key: Option<String>,
    /// Directory searched for image.jpg, audio.mp3 and video.mp4 (repeatable)
    #[arg(long = "media-dir", global = true)]
    media_dirs: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Generations allowed to run at once
        #[arg(long, default_value_t = 1)]
        max_concurrent: usize,
    },
    /// Caption the default media files
    Caption {
        #[command(flatten)]
        args: TaskArgs,
    },
    /// Ask whether an event occurs in the default media files
    Detect {
        #[command(flatten)]
        args: TaskArgs,
    },
    /// Run prompts fetched from a remote YAML document
    DynamicPrompting {
        /// URL of the YAML (or JSON, or three-line) config
        #[arg(long)]
        yaml_url: String,
        /// Minutes between runs; 0 runs once
        #[arg(long, default_value_t = 5.0)]
        period: f64,
        #[arg(long)]
        publish: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Image,
    Audio,
    Video,
}

impl From<Mode> for MediaKind {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Image => MediaKind::Image,
            Mode::Audio => MediaKind::Audio,
            Mode::Video => MediaKind::Video,
        }
    }
}

#[derive(Args, Debug)]
struct TaskArgs {
    /// Media to include
    #[arg(long, required = true, num_args = 1..)]
    modes: Vec<Mode>,
    #[arg(long, default_value = "")]
    user_text: String,
    #[arg(long, default_value_t = 100)]
    max_tokens: u32,
    /// Event to look for (detect only)
    #[arg(long)]
    event_description: Option<String>,
    /// Minutes between runs; 0 runs once
    #[arg(long, default_value_t = 0.0)]
    period: f64,
    /// Publish results: `log` or `jsonl:<path>`
    #[arg(long)]
    publish: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&cli.runtime)?;
    let resolver = if cli.runtime.media_dirs.is_empty() {
        MediaResolver::default()
    } else {
        MediaResolver::new(cli.runtime.media_dirs.clone())
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            max_concurrent,
        } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("invalid listen address {}:{}", host, port))?;
            if let Err(e) = pipeline.backend().initialize().await {
                warn!(error = %e, "backend not ready yet, will retry on first request");
            }
            gemma3n_server::serve(addr, AppState::new(pipeline, max_concurrent), shutdown_signal())
                .await
                .context("HTTP server failed")
        }
        Commands::Caption { args } => run_task(Task::Caption, args, pipeline, resolver).await,
        Commands::Detect { args } => run_task(Task::Detect, args, pipeline, resolver).await,
        Commands::DynamicPrompting {
            yaml_url,
            period,
            publish,
        } => {
            let mut scheduler = Scheduler::new(
                Box::new(RemoteConfigSource::new(yaml_url)),
                pipeline,
                resolver,
                period_from_minutes(period)?,
            );
            if let Some(target) = publish.as_deref() {
                scheduler = scheduler.with_sink(open_sink(target)?);
            }
            let mut last = None;
            scheduler
                .run(shutdown_signal(), |outcome| {
                    report::dynamic_banner(outcome);
                    last = Some(outcome.clone());
                })
                .await;
            finish_once(period, last)
        }
    }
}

async fn run_task(
    task: Task,
    args: TaskArgs,
    pipeline: DispatchPipeline,
    resolver: MediaResolver,
) -> anyhow::Result<()> {
    let has_event = args
        .event_description
        .as_deref()
        .is_some_and(|e| !e.trim().is_empty());
    if task == Task::Detect && !has_event {
        bail!("--event-description is required for detect");
    }

    let modes: BTreeSet<MediaKind> = args.modes.iter().copied().map(MediaKind::from).collect();
    let mut files = Vec::with_capacity(modes.len());
    for &kind in &modes {
        let path = resolver.resolve(kind).with_context(|| {
            format!(
                "{} file not found: looked for {} in {}",
                kind,
                default_file(kind),
                resolver
                    .search_dirs()
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;
        files.push(path);
    }

    let plan = TaskPlan::build(task, files, &args.user_text, args.event_description.as_deref())?;
    info!(task = %task, files = plan.files.len(), "running task");
    let config = ScheduleConfig {
        system_prompt: plan.system_text,
        user_prompt: plan.user_text,
        modes,
        max_tokens: args.max_tokens,
        interval_seconds: None,
    };

    let mut scheduler = Scheduler::new(
        Box::new(FixedConfigSource::new(config)),
        pipeline,
        resolver,
        period_from_minutes(args.period)?,
    )
    .with_task(task.as_str(), args.event_description.clone());
    if let Some(target) = args.publish.as_deref() {
        scheduler = scheduler.with_sink(open_sink(target)?);
    }

    let event = args.event_description.clone();
    let mut last = None;
    scheduler
        .run(shutdown_signal(), |outcome| {
            report::task_banner(task.as_str(), event.as_deref(), outcome);
            last = Some(outcome.clone());
        })
        .await;
    finish_once(args.period, last)
}

fn build_pipeline(runtime: &RuntimeArgs) -> anyhow::Result<DispatchPipeline> {
    let scratch = match &runtime.scratch_dir {
        Some(dir) => ScratchSpace::new(dir),
        None => ScratchSpace::system(),
    }
    .context("failed to prepare scratch directory")?;

    let decoder = FfmpegDecoder::default();
    if !decoder.is_available() {
        warn!("ffmpeg/ffprobe not found on PATH; video inputs will fail to decode");
    }
    let sampler = FrameSampler::new(
        Arc::new(decoder),
        SamplingConfig {
            target_fps: runtime.target_fps,
            max_frames: runtime.max_frames,
        },
    );

    let backend = BackendConfig {
        provider: runtime.provider,
        model: runtime.model.clone(),
        endpoint: runtime.endpoint.clone(),
        api_key: runtime.gemini_api_key.clone(),
    }
    .build();

    Ok(DispatchPipeline::new(scratch, ContentNormalizer::new(sampler), backend))
}

fn open_sink(target: &str) -> anyhow::Result<Arc<dyn PublishSink>> {
    match target.split_once(':') {
        None if target == "log" => Ok(Arc::new(LogSink)),
        Some(("jsonl", path)) if !path.is_empty() => {
            let sink = JsonLinesSink::open(path)
                .with_context(|| format!("failed to open publish file {}", path))?;
            Ok(Arc::new(sink))
        }
        _ => bail!("invalid --publish value '{}', expected 'log' or 'jsonl:<path>'", target),
    }
}

fn positive_fps(value: &str) -> Result<f64, String> {
    let fps: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err(format!("must be a positive number of frames per second, got {value}"))
    }
}

fn period_from_minutes(minutes: f64) -> anyhow::Result<Duration> {
    if minutes < 0.0 {
        bail!("--period must be a non-negative number of minutes, got {}", minutes);
    }
    Duration::try_from_secs_f64(minutes * 60.0)
        .with_context(|| format!("--period of {} minutes is out of range", minutes))
}

/// A single run reports its own failure through the exit status.
fn finish_once(period: f64, last: Option<CycleOutcome>) -> anyhow::Result<()> {
    if period > 0.0 {
        return Ok(());
    }
    match last {
        Some(CycleOutcome::Dispatched { .. }) => Ok(()),
        Some(CycleOutcome::Skipped { reason }) => bail!("run skipped: {}", reason),
        Some(CycleOutcome::Failed { error, .. }) => bail!("run failed: {}", error),
        None => bail!("interrupted before the run completed"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
