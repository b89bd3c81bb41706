//! Continuous live capture loop.
//!
//! State machine: Idle -> Running -> Idle. While running the loop captures a
//! preview frame, encodes it to JPEG, submits it through the image detection
//! contract, fetches the annotated render, and draws it onto the canvas
//! surface; the next iteration is scheduled after a fixed delay regardless of
//! whether the previous submission succeeded.
//!
//! Each dispatched frame carries a monotonically increasing sequence number.
//! A response is applied only when the session is still running, the UI is
//! still in Live mode, and the sequence is the highest applied so far, so a
//! stale response resolving after `stop()` (or after a newer frame) is
//! discarded instead of drawn.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::{CameraConfig, CameraSource, DEFAULT_CAPTURE_INTERVAL};
use crate::client::{DetectClient, DetectionResult};
use crate::pipeline::lock_ui;
use crate::ui::{Mode, UiState};

/// Configuration for a live session.
#[derive(Clone, Debug)]
pub struct LiveConfig {
    pub camera: CameraConfig,
    /// Delay between loop iterations.
    pub interval: Duration,
    pub confidence: f32,
    pub jpeg_quality: u8,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            interval: DEFAULT_CAPTURE_INTERVAL,
            confidence: 0.5,
            jpeg_quality: 80,
        }
    }
}

/// Counters for a live session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveStats {
    pub frames_submitted: u64,
    pub results_applied: u64,
    pub stale_discarded: u64,
}

#[derive(Debug, Default)]
struct LiveCounters {
    frames_submitted: AtomicU64,
    results_applied: AtomicU64,
    stale_discarded: AtomicU64,
}

impl LiveCounters {
    fn snapshot(&self) -> LiveStats {
        LiveStats {
            frames_submitted: self.frames_submitted.load(Ordering::SeqCst),
            results_applied: self.results_applied.load(Ordering::SeqCst),
            stale_discarded: self.stale_discarded.load(Ordering::SeqCst),
        }
    }
}

/// A running live capture session. Owns the camera and the loop thread;
/// stopping (or dropping) the session releases both.
#[derive(Debug)]
pub struct LiveSession {
    running: Arc<AtomicBool>,
    counters: Arc<LiveCounters>,
    join: Option<JoinHandle<()>>,
}

impl LiveSession {
    /// Acquire the camera and start the loop. If the camera cannot be
    /// acquired the session never enters Running and the error propagates.
    pub fn start(
        config: LiveConfig,
        client: DetectClient,
        ui: Arc<Mutex<UiState>>,
    ) -> Result<Self> {
        let mut camera = CameraSource::new(config.camera.clone())?;
        camera
            .connect()
            .with_context(|| format!("acquire camera {}", config.camera.device))?;

        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(LiveCounters::default());

        let running_thread = running.clone();
        let counters_thread = counters.clone();
        let join = std::thread::spawn(move || {
            run_loop(camera, client, ui, config, running_thread, counters_thread);
        });

        Ok(Self {
            running,
            counters,
            join: Some(join),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.join.is_some()
    }

    pub fn stats(&self) -> LiveStats {
        self.counters.snapshot()
    }

    /// Halt the loop and release the camera. No further frame capture or
    /// submission occurs once this returns; an iteration already awaiting a
    /// response finishes but its result is discarded.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    mut camera: CameraSource,
    client: DetectClient,
    ui: Arc<Mutex<UiState>>,
    config: LiveConfig,
    running: Arc<AtomicBool>,
    counters: Arc<LiveCounters>,
) {
    let mut seq: u64 = 0;
    let mut last_applied: u64 = 0;
    while running.load(Ordering::SeqCst) {
        seq += 1;
        if let Err(err) = run_iteration(
            &mut camera,
            &client,
            &ui,
            &config,
            &running,
            &counters,
            seq,
            &mut last_applied,
        ) {
            log::warn!("live frame {} failed: {}", seq, err);
        }
        // The next iteration is scheduled regardless of this one's outcome.
        std::thread::sleep(config.interval);
    }
    camera.release();
    log::info!("live session stopped: {:?}", counters.snapshot());
}

#[allow(clippy::too_many_arguments)]
fn run_iteration(
    camera: &mut CameraSource,
    client: &DetectClient,
    ui: &Mutex<UiState>,
    config: &LiveConfig,
    running: &AtomicBool,
    counters: &LiveCounters,
    seq: u64,
    last_applied: &mut u64,
) -> Result<()> {
    let frame = camera.next_frame()?;
    let jpeg = frame.to_jpeg(config.jpeg_quality)?;
    counters.frames_submitted.fetch_add(1, Ordering::SeqCst);

    let result = client.detect_image(&jpeg, "frame.jpg", config.confidence)?;

    // The session may have stopped, or a newer frame may have rendered,
    // while this request was in flight.
    if !running.load(Ordering::SeqCst) || seq <= *last_applied {
        counters.stale_discarded.fetch_add(1, Ordering::SeqCst);
        return Ok(());
    }

    let annotated = client.fetch_annotated(&result.media_url)?;
    let decoded = image::load_from_memory(&annotated).context("decode annotated frame")?;

    let mut ui = lock_ui(ui);
    if !running.load(Ordering::SeqCst) || ui.mode() != Mode::Live {
        counters.stale_discarded.fetch_add(1, Ordering::SeqCst);
        return Ok(());
    }
    ui.size_canvas(decoded.width(), decoded.height());
    ui.apply_result(
        Mode::Live,
        &DetectionResult {
            media_url: result.media_url,
            counts: result.counts,
        },
    );
    *last_applied = seq;
    counters.results_applied.fetch_add(1, Ordering::SeqCst);
    Ok(())
}
