mod config;
mod presenter;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use presenter::TerminalPresenter;
use rollcall_core::session::{FrameSource, SessionReport, SystemClock, Termination};
use rollcall_core::{
    store, CooldownLedger, CsvAttendanceLog, EncodingStore, FirstMatchMatcher, OnnxEncoder, RecognitionSession,
};
use rollcall_hw::{Camera, ReplayFeed};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance tracker")]
struct Cli {
    /// TOML config file (default: $ROLLCALL_CONFIG, else built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture (or import) a reference photo for a person
    Enroll {
        /// Identity name, used as the photo's file name
        name: String,
        /// Import this image instead of capturing from the camera
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Overwrite an existing reference photo for the same name
        #[arg(long)]
        replace: bool,
    },
    /// Recognise faces and log attendance until Ctrl-C
    Run {
        /// Replay images from a directory instead of the camera
        #[arg(long)]
        replay: Option<PathBuf>,
        /// Keep a copy of the latest frame at this path with face boxes drawn
        /// (boxes only, no names: green = marked, red = unknown or not yet logged;
        /// names are printed in the terminal)
        #[arg(long)]
        preview: Option<PathBuf>,
    },
    /// List enrolled reference photos
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show the attendance log
    Log {
        /// Only rows for this person
        #[arg(long)]
        name: Option<String>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Enroll { name, photo, replace } => {
            tokio::task::spawn_blocking(move || enroll(&config, &name, photo.as_deref(), replace))
                .await
                .context("enroll task panicked")??;
        }
        Commands::Run { replay, preview } => {
            let stop = Arc::new(AtomicBool::new(false));
            let signal_stop = stop.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if on_interrupt(&signal_stop) == Interrupt::Exit {
                        eprintln!("interrupted again, exiting");
                        std::process::exit(130);
                    }
                    tracing::info!("Ctrl-C received, stopping after the current frame (press again to exit now)");
                }
            });

            let report = tokio::task::spawn_blocking(move || run(&config, replay.as_deref(), preview, stop))
                .await
                .context("recognition thread panicked")??;
            let Some(report) = report else {
                println!("Stopped before recognition started");
                return Ok(());
            };

            println!(
                "{} frames, {} faces, {} attendance rows written",
                report.frames_processed, report.faces_seen, report.records_written
            );
            if report.write_failures > 0 {
                eprintln!("warning: {} attendance rows could not be written", report.write_failures);
            }
            if let Termination::CameraFailure(e) = report.termination {
                bail!("stopped on camera failure: {e}");
            }
        }
        Commands::List { json } => list(&config, json)?,
        Commands::Log { name } => show_log(&config, name.as_deref())?,
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// First signal: ask the loop to stop after the current frame.
    Stop,
    /// A stop was already pending.
    Exit,
}

fn on_interrupt(stop: &AtomicBool) -> Interrupt {
    if stop.swap(true, Ordering::Relaxed) {
        Interrupt::Exit
    } else {
        Interrupt::Stop
    }
}

fn enroll(config: &Config, name: &str, photo: Option<&Path>, replace: bool) -> Result<()> {
    let mut encoder = OnnxEncoder::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;

    let image = match photo {
        Some(path) => store::read_rgb(path)?,
        None => {
            let camera = Camera::open(&config.camera_device)
                .with_context(|| format!("failed to open camera {}", config.camera_device))?;
            println!("Look at the camera...");
            camera
                .capture_still(config.warmup_frames, config.capture_attempts)
                .context("failed to capture reference photo")?
                .image
        }
    };

    let store = EncodingStore::new(&config.known_faces_dir);
    let identity = store
        .enroll(name, &image, &mut encoder, replace)
        .with_context(|| format!("failed to enroll {name:?}"))?;
    println!("Enrolled {} in {}", identity.name, store.dir().display());
    Ok(())
}

/// Returns `None` when Ctrl-C arrived while models and known faces were loading.
fn run(
    config: &Config,
    replay: Option<&Path>,
    preview: Option<PathBuf>,
    stop: Arc<AtomicBool>,
) -> Result<Option<SessionReport>> {
    let mut encoder = OnnxEncoder::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;

    let known = EncodingStore::new(&config.known_faces_dir)
        .load(&mut encoder)
        .context("failed to load known faces")?;
    if known.is_empty() {
        tracing::warn!(dir = %config.known_faces_dir.display(), "no known faces; every face will be Unknown");
    }

    if stop.load(Ordering::Relaxed) {
        return Ok(None);
    }

    let mut sink = CsvAttendanceLog::open(&config.log_path)?;
    let matcher = FirstMatchMatcher::new(config.tolerance);
    tracing::info!(tolerance = matcher.tolerance(), log = %sink.path().display(), "matching against known faces");
    let mut session = RecognitionSession::new(&known, encoder, matcher, CooldownLedger::new(config.cooldown()));
    let mut presenter = TerminalPresenter::new(stop, preview);

    let report = match replay {
        Some(dir) => {
            let mut feed = ReplayFeed::open(dir)?;
            println!("Replaying {} frames from {}", feed.remaining(), dir.display());
            drive(&mut session, &mut feed, &mut sink, &mut presenter)?
        }
        None => {
            let camera = Camera::open(&config.camera_device)
                .with_context(|| format!("failed to open camera {}", config.camera_device))?;
            let mut stream = camera.stream()?;
            println!("Watching {} (Ctrl-C to stop)", config.camera_device);
            drive(&mut session, &mut stream, &mut sink, &mut presenter)?
        }
    };
    Ok(Some(report))
}

fn drive(
    session: &mut RecognitionSession<'_, OnnxEncoder, FirstMatchMatcher>,
    source: &mut dyn FrameSource,
    sink: &mut CsvAttendanceLog,
    presenter: &mut TerminalPresenter,
) -> Result<SessionReport> {
    Ok(session.run(source, sink, presenter, &SystemClock)?)
}

fn list(config: &Config, json: bool) -> Result<()> {
    let store = EncodingStore::new(&config.known_faces_dir);
    let photos = store.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&photos)?);
        return Ok(());
    }
    if photos.is_empty() {
        println!("No faces enrolled in {}", store.dir().display());
        return Ok(());
    }
    for photo in &photos {
        println!("{:<24} {}", photo.name, photo.path.display());
    }
    println!("{} enrolled", photos.len());
    Ok(())
}

fn show_log(config: &Config, name: Option<&str>) -> Result<()> {
    if !config.log_path.exists() {
        println!("No attendance recorded yet ({})", config.log_path.display());
        return Ok(());
    }
    let log = CsvAttendanceLog::open(&config.log_path)?;
    let records = log.read_all()?;

    let mut shown = 0;
    for record in records.iter().filter(|r| name.map_or(true, |n| r.name == n)) {
        println!("{}  {}", record.timestamp_string(), record.name);
        shown += 1;
    }
    println!("{shown} rows");
    Ok(())
}
