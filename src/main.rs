//! Chords Recorder - Main Entry Point
//!
//! Command-line front-end over the recording worker: list and export stored
//! sessions, run a synthetic stream through the recording path, or send a raw
//! wire request.

use anyhow::{bail, Context, Result};
use chords_recorder::{
    backend::{spawn_worker, StoreLocation, WorkerHandle},
    config::AppConfig,
    session::Acquisition,
    stream::RenderSurface,
    types::Frame,
};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "chords-recorder",
    version,
    about = "Record, inspect and export multi-channel signal sessions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Recording store file, overriding the config
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Also write daily-rolling log files into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// List stored sessions
    List,
    /// Export one session as CSV, or every session as a ZIP archive
    Export(ExportArgs),
    /// Feed a synthetic device stream through the recording path
    Simulate(SimulateArgs),
    /// Read one JSON wire request from stdin and print the response
    Request,
}

#[derive(Args)]
struct ExportArgs {
    /// Session to export
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    filename: Option<String>,

    /// Export every session into one archive
    #[arg(long)]
    all: bool,

    /// Channels per row (default: from config)
    #[arg(long)]
    channels: Option<usize>,

    /// Output file (default: the session name, or ChordsRecordings.zip)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct SimulateArgs {
    /// Number of frames to generate
    #[arg(long, default_value_t = 1000)]
    frames: usize,

    /// Channels per frame (default: from config)
    #[arg(long)]
    channels: Option<usize>,

    /// Drop every Nth frame before it reaches the recorder
    #[arg(long)]
    drop_every: Option<usize>,

    /// Session name (default: generated from the current time)
    #[arg(long)]
    filename: Option<String>,

    /// Frames per second; 0 runs as fast as possible
    #[arg(long, default_value_t = 0)]
    rate_hz: u64,
}

/// Stand-in display that only counts what it is shown
#[derive(Default)]
struct FrameCounter {
    rendered: u64,
}

impl RenderSurface for FrameCounter {
    fn update(&mut self, _frame: &Frame) {
        self.rendered += 1;
    }
}

fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "chords-recorder.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chords_recorder=debug")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // Held until exit so buffered log lines are flushed
    let _log_guard = init_logging(cli.log_dir.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(Some(path))?,
        None => AppConfig::load_or_default(None),
    };
    if let Some(store) = cli.store {
        config.store.path = Some(store);
    }

    let location = StoreLocation::File(config.store_path()?);
    tracing::debug!("Using store {:?}", location);
    let worker = spawn_worker(location, &config.worker)?;

    match cli.command {
        Command::List => list(worker),
        Command::Export(args) => export(worker, &config, args),
        Command::Simulate(args) => simulate(worker, &config, args),
        Command::Request => request(worker),
    }
}

fn list(mut worker: WorkerHandle) -> Result<()> {
    let records = worker.read_all()?;
    if records.is_empty() {
        println!("No recordings");
    }
    for indexed in &records {
        println!(
            "{:>4}  {}  ({} frames)",
            indexed.id,
            indexed.record.filename,
            indexed.record.frame_count()
        );
    }
    worker.shutdown()?;
    Ok(())
}

fn export(mut worker: WorkerHandle, config: &AppConfig, args: ExportArgs) -> Result<()> {
    let channels = args.channels.unwrap_or(config.stream.channel_count);

    let (bytes, default_output) = match (&args.filename, args.all) {
        (_, true) => (worker.export_all(channels)?, PathBuf::from("ChordsRecordings.zip")),
        (Some(filename), false) => (worker.export_one(filename, channels)?, PathBuf::from(filename)),
        (None, false) => bail!("Give a session name or --all"),
    };

    let output = args.output.unwrap_or(default_output);
    std::fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("Wrote {} bytes to {}", bytes.len(), output.display());

    worker.shutdown()?;
    Ok(())
}

fn simulate(worker: WorkerHandle, config: &AppConfig, args: SimulateArgs) -> Result<()> {
    let channels = args.channels.unwrap_or(config.stream.channel_count);
    let interval = (args.rate_hz > 0).then(|| Duration::from_micros(1_000_000 / args.rate_hz));

    let mut acquisition = Acquisition::new(Some(FrameCounter::default()), worker, config);
    let filename = acquisition.start_recording(args.filename);

    for n in 0..args.frames {
        if matches!(args.drop_every, Some(k) if k > 0 && (n + 1) % k == 0) {
            continue;
        }
        acquisition.on_frame(synthetic_frame(n, channels, config))?;
        if let Some(interval) = interval {
            std::thread::sleep(interval);
            acquisition.tick()?;
        }
    }
    acquisition.stop_recording()?;

    let tally = acquisition.tally();
    let rendered = acquisition
        .dispatcher()
        .surface()
        .map(|s| s.rendered)
        .unwrap_or_default();
    println!("Session:        {}", filename);
    println!("Frames sent:    {}", acquisition.frames_seen());
    println!("Frames shown:   {}", rendered);
    println!("Frames stored:  {}", acquisition.frames_stored());
    println!("Gaps detected:  {}", tally.gaps);
    println!("Frames missing: {}", tally.missing_frames);
    if acquisition.failed_writes() > 0 {
        println!("Failed writes:  {}", acquisition.failed_writes());
    }

    acquisition.into_handle().shutdown()?;
    Ok(())
}

/// A sine per channel plus the wrapping counter
fn synthetic_frame(n: usize, channels: usize, config: &AppConfig) -> Frame {
    use chords_recorder::types::{CounterPosition, COUNTER_MODULUS};

    let counter = (n % COUNTER_MODULUS as usize) as f64;
    let samples = (0..channels).map(|ch| {
        let phase = n as f64 / 50.0 + ch as f64;
        (phase.sin() * 512.0 + 512.0).round()
    });

    let values = match config.stream.counter_position {
        CounterPosition::Leading => std::iter::once(counter).chain(samples).collect(),
        CounterPosition::Trailing => samples.chain(std::iter::once(counter)).collect(),
    };
    Frame::new(values)
}

fn request(mut worker: WorkerHandle) -> Result<()> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read request from stdin")?;

    let id = worker.submit_raw(text)?;
    let response = worker.wait(id)?;
    println!("{}", response.encode()?);

    worker.shutdown()?;
    Ok(())
}
