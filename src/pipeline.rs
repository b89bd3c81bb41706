//! One-shot submission lifecycle for image and video uploads.
//!
//! Each submission follows the same contract: take the single-flight gate,
//! start a progress estimator, issue the request, then either render the
//! result or collapse the progress display on failure. The gate is released
//! on every exit path, including panics, because the permit restores it on
//! `Drop`; correctness never depends on any widget being disabled.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::client::{DetectClient, DetectionResult};
use crate::progress::{ProgressTicker, RandomizedProgress, TimeBasedProgress};
use crate::ui::{Mode, UiState};

/// Explicit in-flight guard for one submission pipeline.
///
/// At most one submission may run at a time; re-entry fails immediately
/// instead of queueing.
#[derive(Debug, Default)]
pub struct SubmitGate {
    busy: AtomicBool,
}

impl SubmitGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Result<SubmitPermit<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(anyhow!("a submission is already in flight"));
        }
        Ok(SubmitPermit { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

pub struct SubmitPermit<'a> {
    gate: &'a SubmitGate,
}

impl Drop for SubmitPermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::SeqCst);
    }
}

/// Delays and tick rates for the submission pipelines. Defaults mirror the
/// interactive client; tests shrink them to keep runs fast.
#[derive(Clone, Copy, Debug)]
pub struct PipelineTiming {
    /// Assumed nominal duration of an image detection round-trip.
    pub image_nominal: Duration,
    pub image_tick: Duration,
    /// How long the completed progress display stays up after an image result.
    pub image_hold: Duration,
    pub video_tick: Duration,
    /// Longer hold after video results, reflecting heavier payloads.
    pub video_hold: Duration,
    /// Wait after a video response before attaching the source, covering
    /// asynchronous completion of server-side file persistence.
    pub persistence_wait: Duration,
}

impl Default for PipelineTiming {
    fn default() -> Self {
        Self {
            image_nominal: Duration::from_secs(3),
            image_tick: Duration::from_millis(100),
            image_hold: Duration::from_millis(1500),
            video_tick: Duration::from_millis(500),
            video_hold: Duration::from_secs(2),
            persistence_wait: Duration::from_secs(1),
        }
    }
}

impl PipelineTiming {
    /// Timing with no holds or waits, for tests.
    pub fn instant() -> Self {
        Self {
            image_nominal: Duration::from_secs(3),
            image_tick: Duration::from_millis(10),
            image_hold: Duration::ZERO,
            video_tick: Duration::from_millis(10),
            video_hold: Duration::ZERO,
            persistence_wait: Duration::ZERO,
        }
    }
}

pub(crate) fn lock_ui(ui: &Mutex<UiState>) -> MutexGuard<'_, UiState> {
    match ui.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The image/video submission pipeline.
pub struct Pipeline {
    client: DetectClient,
    ui: Arc<Mutex<UiState>>,
    gate: SubmitGate,
    timing: PipelineTiming,
}

impl Pipeline {
    pub fn new(client: DetectClient, ui: Arc<Mutex<UiState>>) -> Self {
        Self::with_timing(client, ui, PipelineTiming::default())
    }

    pub fn with_timing(
        client: DetectClient,
        ui: Arc<Mutex<UiState>>,
        timing: PipelineTiming,
    ) -> Self {
        Self {
            client,
            ui,
            gate: SubmitGate::new(),
            timing,
        }
    }

    pub fn gate(&self) -> &SubmitGate {
        &self.gate
    }

    /// Submit an image file for detection and render the outcome.
    pub fn submit_image(&self, path: &Path, confidence: f32) -> Result<DetectionResult> {
        let _permit = self.gate.acquire()?;
        let bytes = std::fs::read(path)
            .with_context(|| format!("read image file {}", path.display()))?;
        let file_name = display_name(path, "upload.jpg");
        log::info!("submitting image {} ({} bytes)", path.display(), bytes.len());

        let mut ticker = ProgressTicker::spawn(
            Box::new(TimeBasedProgress::new(self.timing.image_nominal)),
            self.timing.image_tick,
        );

        match self.client.detect_image(&bytes, &file_name, confidence) {
            Ok(result) => {
                ticker.complete();
                let source = self.client.cache_busted(&result.media_url)?;
                lock_ui(&self.ui).apply_result(
                    Mode::Image,
                    &DetectionResult {
                        media_url: source,
                        counts: result.counts,
                    },
                );
                std::thread::sleep(self.timing.image_hold);
                ticker.collapse();
                Ok(result)
            }
            Err(err) => {
                ticker.collapse();
                log::error!("image detection failed: {}", err);
                Err(err.into())
            }
        }
    }

    /// Submit a video file for detection and render the outcome.
    ///
    /// A response body carrying an error field counts as a backend failure
    /// even though the transport call succeeded; no source is attached.
    pub fn submit_video(&self, path: &Path, confidence: f32) -> Result<DetectionResult> {
        let _permit = self.gate.acquire()?;
        let bytes = std::fs::read(path)
            .with_context(|| format!("read video file {}", path.display()))?;
        let file_name = display_name(path, "upload.mp4");
        log::info!("submitting video {} ({} bytes)", path.display(), bytes.len());

        let mut ticker = ProgressTicker::spawn(
            Box::new(RandomizedProgress::new()),
            self.timing.video_tick,
        );

        match self.client.detect_video(&bytes, &file_name, confidence) {
            Ok(result) => {
                ticker.complete();
                // The backend may still be flushing the rendered file when it
                // responds; wait before attaching the source.
                std::thread::sleep(self.timing.persistence_wait);
                let source = self.client.resolve(&result.media_url)?.to_string();
                lock_ui(&self.ui).apply_result(
                    Mode::Video,
                    &DetectionResult {
                        media_url: source,
                        counts: result.counts,
                    },
                );
                self.client.probe_playback(&result.media_url);
                std::thread::sleep(self.timing.video_hold);
                ticker.collapse();
                Ok(result)
            }
            Err(err) => {
                ticker.collapse();
                if err.is_backend() {
                    log::error!("video processing rejected by backend: {}", err);
                } else {
                    log::error!("video detection failed: {}", err);
                }
                Err(err.into())
            }
        }
    }
}

fn display_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_allows_one_submission_at_a_time() {
        let gate = SubmitGate::new();
        let permit = gate.acquire().expect("first acquire");
        assert!(gate.is_busy());
        assert!(gate.acquire().is_err(), "re-entry must be rejected");
        drop(permit);
        assert!(!gate.is_busy());
        gate.acquire().expect("gate reusable after release");
    }

    #[test]
    fn permit_releases_on_unwind() {
        let gate = SubmitGate::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = gate.acquire().expect("acquire");
            panic!("submission blew up");
        }));
        assert!(outcome.is_err());
        assert!(!gate.is_busy(), "gate must be released after a panic");
    }

    #[test]
    fn missing_file_releases_gate() {
        let client = DetectClient::new("http://127.0.0.1:9").expect("client");
        let ui = Arc::new(Mutex::new(UiState::new()));
        let pipeline = Pipeline::with_timing(client, ui, PipelineTiming::instant());
        let err = pipeline.submit_image(Path::new("/nonexistent/road.jpg"), 0.5);
        assert!(err.is_err());
        assert!(!pipeline.gate().is_busy());
    }
}
