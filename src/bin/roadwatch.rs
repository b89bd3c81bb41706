//! roadwatch - road hazard detection client
//!
//! Submits images, videos, or live camera frames to a remote detection
//! service and reports the annotated output reference plus per-category
//! counts (potholes, plastic, other litter).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roadwatch::{
    CameraConfig, ClientConfig, DetectClient, DetectionCounts, LiveConfig, LiveSession, Mode,
    Pipeline, UiState,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Submit images, videos, or live camera frames to a road hazard detection service"
)]
struct Args {
    /// Backend origin (e.g., http://127.0.0.1:8000).
    #[arg(long, env = "ROADWATCH_BACKEND_URL")]
    backend_url: Option<String>,

    /// Detection confidence threshold (0.0..=1.0).
    #[arg(long)]
    confidence: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a single image for detection
    Image {
        /// Image file to submit.
        file: PathBuf,
    },
    /// Submit a video for detection
    Video {
        /// Video file to submit.
        file: PathBuf,
    },
    /// Run the continuous live capture loop until interrupted
    Live {
        /// Camera device path, or stub:// for synthetic frames.
        #[arg(long, env = "ROADWATCH_CAMERA_DEVICE")]
        device: Option<String>,

        /// Delay between capture iterations in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ClientConfig::load()?;
    if let Some(backend_url) = args.backend_url {
        cfg.backend_url = backend_url;
    }
    if let Some(confidence) = args.confidence {
        cfg.confidence = confidence;
    }

    let client = DetectClient::new(&cfg.backend_url)?;
    let ui = Arc::new(Mutex::new(UiState::new()));

    match args.command {
        Command::Image { file } => {
            switch_mode(&ui, Mode::Image);
            let pipeline = Pipeline::new(client, ui.clone());
            let result = pipeline.submit_image(&file, cfg.confidence)?;
            report_counts(&result.counts);
            if let Some(source) = source_of(&ui, Mode::Image) {
                println!("annotated image: {}", source);
            }
        }
        Command::Video { file } => {
            switch_mode(&ui, Mode::Video);
            let pipeline = Pipeline::new(client, ui.clone());
            let result = pipeline.submit_video(&file, cfg.confidence)?;
            report_counts(&result.counts);
            if let Some(source) = source_of(&ui, Mode::Video) {
                println!("annotated video: {}", source);
            }
        }
        Command::Live {
            device,
            interval_ms,
        } => {
            switch_mode(&ui, Mode::Live);
            let live_cfg = LiveConfig {
                camera: CameraConfig {
                    device: device.unwrap_or(cfg.live.device),
                    width: cfg.live.width,
                    height: cfg.live.height,
                },
                interval: interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(cfg.live.interval),
                confidence: cfg.confidence,
                jpeg_quality: 80,
            };
            run_live(live_cfg, client, ui)?;
        }
    }

    Ok(())
}

fn run_live(cfg: LiveConfig, client: DetectClient, ui: Arc<Mutex<UiState>>) -> Result<()> {
    let mut session = LiveSession::start(cfg, client, ui.clone())?;
    log::info!("live capture running; press Ctrl-C to stop");

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_handler = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_handler.store(true, Ordering::SeqCst);
    })
    .context("install interrupt handler")?;

    let mut last_counts = DetectionCounts::default();
    while !interrupted.load(Ordering::SeqCst) && session.is_running() {
        std::thread::sleep(Duration::from_millis(200));
        let counts = lock(&ui).counts();
        if counts != last_counts {
            report_counts(&counts);
            last_counts = counts;
        }
    }

    session.stop();
    let stats = session.stats();
    println!(
        "live session finished: {} frames submitted, {} results applied, {} stale discarded",
        stats.frames_submitted, stats.results_applied, stats.stale_discarded
    );
    Ok(())
}

fn switch_mode(ui: &Mutex<UiState>, mode: Mode) {
    lock(ui).switch_mode(mode);
}

fn source_of(ui: &Mutex<UiState>, mode: Mode) -> Option<String> {
    let ui = lock(ui);
    match mode {
        Mode::Image => ui.image_surface().source.clone(),
        Mode::Video => ui.video_surface().source.clone(),
        Mode::Live => ui.canvas_surface().source.clone(),
    }
}

fn lock(ui: &Mutex<UiState>) -> std::sync::MutexGuard<'_, UiState> {
    match ui.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn report_counts(counts: &DetectionCounts) {
    println!(
        "potholes: {}  plastic: {}  other litter: {}",
        counts.pothole, counts.plastic, counts.otherlitter
    );
}
