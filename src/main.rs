// src/main.rs

mod config;
mod error;
mod inference;
mod interface;
mod ledger;
mod ocr;
mod pipeline;
mod plate_detection;
mod preprocessing;
mod record_store;
mod tracker;
mod types;
mod video_processor;
mod zone;

use clap::Parser;
use error::StartupError;
use interface::{SystemClock, TextRecognizer};
use ocr::{NullRecognizer, OnnxTextRecognizer};
use pipeline::{ExtractionOrchestrator, FrameLoopDriver, MetricsSummary};
use plate_detection::PlateDetector;
use record_store::{CsvRecordStore, SessionOutput};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracker::{IouTracker, TrackedDetector};
use types::Config;
use video_processor::{OpencvImageWriter, OverlaySink, VideoSource};
use zone::Region;

#[derive(Parser, Debug)]
#[command(
    name = "helmet-monitor",
    about = "Records number plates of riders without a helmet inside a monitored zone",
    after_help = "Ctrl-C stops after the current frame and finalizes the CSV and annotated \
                  video. A second Ctrl-C force-quits immediately: rows already written are \
                  kept, but the annotated video may be left unplayable."
)]
struct Cli {
    /// YAML config, which must exist. Without this flag ./config.yaml is used
    /// if present, otherwise built-in defaults
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
    /// Overrides source.uri (file, stream URL or camera index)
    #[arg(long, value_name = "URI")]
    source: Option<String>,
    /// Overrides output.root_dir
    #[arg(long, value_name = "DIR")]
    output_dir: Option<String>,
    /// No window, even if display.enabled is set
    #[arg(long)]
    headless: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(uri) = &self.source {
            config.source.uri = uri.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.root_dir = dir.clone();
        }
        if self.headless {
            config.display.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = Config::load_for_startup(cli.config.as_deref());
    let config_path = cli
        .config
        .as_deref()
        .unwrap_or(config::DEFAULT_CONFIG_PATH);
    let default_filter = loaded
        .as_ref()
        .map(Config::log_filter)
        .unwrap_or_else(|_| Config::default().log_filter());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("🏍️  Helmet Monitor Starting");

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => return startup_failed(&e),
    };
    cli.apply(&mut config);
    info!("✓ Configuration loaded ({})", config_path);

    let stop_flag = spawn_interrupt_watcher();

    let mut driver = match build_driver(&config, config_path, stop_flag) {
        Ok(driver) => driver,
        Err(e) => return startup_failed(&e),
    };

    match driver.run() {
        Ok(summary) => {
            log_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Run aborted: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn startup_failed(e: &StartupError) -> ExitCode {
    error!("❌ Startup failed [{}]: {}", e.collaborator(), e);
    ExitCode::FAILURE
}

fn reason(e: anyhow::Error) -> String {
    format!("{e:#}")
}

/// Open every collaborator in dependency order. Nothing is left half-open on
/// failure; already-opened resources are dropped on the way out.
fn build_driver(
    config: &Config,
    config_path: &str,
    stop_flag: Arc<AtomicBool>,
) -> Result<FrameLoopDriver, StartupError> {
    config.validate(config_path)?;

    let region = Region::from_config(&config.zone.polygon)?;
    info!("✓ Zone ready ({} vertices)", region.vertices().len());

    let source = VideoSource::open(&config.source.uri).map_err(|e| StartupError::FrameSource {
        uri: config.source.uri.clone(),
        reason: reason(e),
    })?;

    let detector = PlateDetector::new(&config.detector).map_err(|e| StartupError::Detector {
        path: config.detector.model_path.clone(),
        reason: reason(e),
    })?;
    let tracker = TrackedDetector::new(
        detector,
        IouTracker::new(&config.tracker),
        config.labels.clone(),
    );

    let recognizer: Box<dyn TextRecognizer> = match &config.ocr.model_path {
        Some(path) => Box::new(OnnxTextRecognizer::new(&config.ocr).map_err(|e| {
            StartupError::Recognizer {
                path: path.clone(),
                reason: reason(e),
            }
        })?),
        None => Box::new(NullRecognizer::new()),
    };

    let root = PathBuf::from(&config.output.root_dir);
    let output_err = |e: anyhow::Error| StartupError::Output {
        path: root.display().to_string(),
        reason: reason(e),
    };
    let session =
        SessionOutput::prepare(&root, &chrono::Local::now().date_naive()).map_err(output_err)?;
    let store = CsvRecordStore::open(&session.records_path()).map_err(output_err)?;

    let working_size = (config.source.working_width, config.source.working_height);
    let mut display = config.display.clone();
    if source.fps() > 0.0 {
        display.annotated_fps = source.fps();
    }
    let sink = OverlaySink::new(&display, &config.source.uri, &session.dir, working_size)
        .map_err(|e| StartupError::Display(reason(e)))?;

    let orchestrator = ExtractionOrchestrator::new(
        recognizer,
        Box::new(OpencvImageWriter),
        Box::new(store),
        Box::new(SystemClock),
        session,
        &config.extraction,
    );

    Ok(FrameLoopDriver::new(
        Box::new(source),
        Box::new(tracker),
        orchestrator,
        Box::new(sink),
        region,
        working_size,
        stop_flag,
    ))
}

/// First Ctrl-C asks the loop to stop after the current frame. A second one
/// is a force-quit: the process exits with 130 without teardown. CSV rows
/// survive since each one is flushed on append; the annotated video does not
/// get its trailer.
fn spawn_interrupt_watcher() -> Arc<AtomicBool> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let watcher_flag = stop_flag.clone();

    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl-C handler unavailable: {}", e);
                return;
            }
            if watcher_flag.swap(true, Ordering::SeqCst) {
                warn!("⚠️  Second interrupt, force-quitting without teardown (annotated video left unfinalized)");
                std::process::exit(130);
            }
            warn!("🛑 Ctrl-C received, finishing current frame (press again to force)");
        }
    });

    stop_flag
}

fn log_summary(summary: &MetricsSummary) {
    info!("\n📊 Run Summary:");
    info!("  Stopped: {:?}", summary.stop_reason);
    info!(
        "  Frames: {} ({} with detections)",
        summary.total_frames, summary.frames_with_detections
    );
    info!("  🪖 Violations triggered: {}", summary.triggers);
    info!("  💾 Records written: {}", summary.records_written);
    info!("  🔁 Duplicates suppressed: {}", summary.duplicates_suppressed);
    if summary.ocr_fallbacks > 0 {
        warn!("  ⚠️  Records without OCR text: {}", summary.ocr_fallbacks);
    }
    if summary.skipped_crops > 0 {
        warn!("  ⚠️  Skipped empty crops: {}", summary.skipped_crops);
    }
    info!("  🔢 Unique tracks recorded: {}", summary.unique_tracks);
    info!(
        "  Processing Speed: {:.1} FPS (avg tracking {} µs/frame, {:.1}s total)",
        summary.fps, summary.avg_tracking_us, summary.elapsed_secs
    );
    match summary.to_yaml() {
        Ok(yaml) => debug!("Run summary:\n{}", yaml),
        Err(e) => warn!("Failed to serialize run summary: {:#}", e),
    }
}
