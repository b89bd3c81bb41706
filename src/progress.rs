//! Cosmetic progress estimation for pending detection requests.
//!
//! The backend reports no progress, so the percentage shown while a request
//! is outstanding is simulated. Two strategies share one contract:
//! - time-based (image uploads): percentage tracks elapsed time against a
//!   nominal duration, capped at 90 until the response arrives
//! - randomized-increment (video uploads): bounded random steps per tick,
//!   never decreasing, ceiling 85
//!
//! Both are advisory only. They never gate or block the real request, and the
//! periodic tick must stop as soon as the owning submission's outcome is
//! known; `ProgressTicker` guarantees that on every exit path through `Drop`.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const TIME_BASED_CEILING: f64 = 90.0;
const RANDOMIZED_CEILING: f64 = 85.0;
const RANDOMIZED_MAX_STEP: f64 = 25.0;

/// One display frame of estimated progress.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// Percentage in `0..=100`.
    pub percent: u64,
    /// Optional remaining-time or status hint.
    pub hint: Option<String>,
}

pub trait ProgressStrategy: Send {
    /// Produce the next displayable percentage for the given elapsed time.
    fn advance(&mut self, elapsed: Duration) -> ProgressUpdate;
}

/// Elapsed-time estimator for image uploads: assumes a nominal duration and
/// reports `min(elapsed / nominal * 100, 90)` plus a remaining-time hint.
pub struct TimeBasedProgress {
    nominal: Duration,
}

impl TimeBasedProgress {
    pub fn new(nominal: Duration) -> Self {
        Self { nominal }
    }
}

impl ProgressStrategy for TimeBasedProgress {
    fn advance(&mut self, elapsed: Duration) -> ProgressUpdate {
        let nominal_s = self.nominal.as_secs_f64();
        let percent = if nominal_s > 0.0 {
            (elapsed.as_secs_f64() / nominal_s * 100.0).min(TIME_BASED_CEILING)
        } else {
            TIME_BASED_CEILING
        };
        let remaining = self.nominal.saturating_sub(elapsed);
        let hint = if remaining > Duration::ZERO {
            Some(format!("{:.1}s remaining", remaining.as_secs_f64()))
        } else {
            None
        };
        ProgressUpdate {
            percent: percent as u64,
            hint,
        }
    }
}

/// Randomized-increment estimator for video uploads: each tick adds a bounded
/// random step, capped at 85 until the response resolves. Carries no notion
/// of elapsed-time completion.
pub struct RandomizedProgress {
    percent: f64,
}

impl RandomizedProgress {
    pub fn new() -> Self {
        Self { percent: 0.0 }
    }
}

impl Default for RandomizedProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStrategy for RandomizedProgress {
    fn advance(&mut self, _elapsed: Duration) -> ProgressUpdate {
        if self.percent < RANDOMIZED_CEILING {
            let step: f64 = rand::thread_rng().gen::<f64>() * RANDOMIZED_MAX_STEP;
            self.percent = (self.percent + step).min(RANDOMIZED_CEILING);
        }
        ProgressUpdate {
            percent: self.percent as u64,
            hint: None,
        }
    }
}

/// Cancellable periodic tick driving a progress bar on stderr.
///
/// Owned by exactly one submission call. The tick thread stops when the
/// owner calls `complete` or `collapse`, or when the ticker is dropped on an
/// unwinding path; a dangling tick never outlives its request.
pub struct ProgressTicker {
    bar: ProgressBar,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn spawn(mut strategy: Box<dyn ProgressStrategy>, tick: Duration) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template("{bar:30.cyan} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let bar_thread = bar.clone();
        let join = std::thread::spawn(move || {
            let start = Instant::now();
            while !stop_thread.load(Ordering::SeqCst) {
                let update = strategy.advance(start.elapsed());
                bar_thread.set_position(update.percent.min(100));
                match update.hint {
                    Some(hint) => bar_thread.set_message(hint),
                    None => bar_thread.set_message(""),
                }
                std::thread::sleep(tick);
            }
        });

        Self {
            bar,
            stop,
            join: Some(join),
        }
    }

    /// Stop the tick and snap the display to 100%.
    pub fn complete(&mut self) {
        self.halt();
        self.bar.set_position(100);
        self.bar.set_message("complete");
    }

    /// Stop the tick and collapse the display back to its idle state.
    pub fn collapse(mut self) {
        self.halt();
        self.bar.finish_and_clear();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.halt();
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_based_caps_at_ninety_at_nominal_duration() {
        let mut strategy = TimeBasedProgress::new(Duration::from_secs(3));
        let update = strategy.advance(Duration::from_secs(3));
        assert_eq!(update.percent, 90);
        let update = strategy.advance(Duration::from_secs(30));
        assert_eq!(update.percent, 90);
    }

    #[test]
    fn time_based_tracks_elapsed_below_nominal() {
        let mut strategy = TimeBasedProgress::new(Duration::from_secs(3));
        let update = strategy.advance(Duration::from_millis(1500));
        assert_eq!(update.percent, 50);
        assert_eq!(update.hint.as_deref(), Some("1.5s remaining"));
    }

    #[test]
    fn time_based_drops_hint_once_nominal_passed() {
        let mut strategy = TimeBasedProgress::new(Duration::from_secs(3));
        let update = strategy.advance(Duration::from_secs(4));
        assert!(update.hint.is_none());
    }

    #[test]
    fn randomized_is_monotonic_and_capped() {
        let mut strategy = RandomizedProgress::new();
        let mut previous = 0u64;
        for _ in 0..200 {
            let update = strategy.advance(Duration::ZERO);
            assert!(update.percent >= previous, "percentage must never decrease");
            assert!(update.percent <= 85, "percentage must stay at or below 85");
            previous = update.percent;
        }
        // With 200 bounded random steps the ceiling is reached in practice.
        assert_eq!(previous, 85);
    }

    #[test]
    fn ticker_stops_its_thread_on_collapse() {
        let ticker = ProgressTicker::spawn(
            Box::new(TimeBasedProgress::new(Duration::from_secs(3))),
            Duration::from_millis(5),
        );
        std::thread::sleep(Duration::from_millis(20));
        ticker.collapse();
    }

    #[test]
    fn ticker_completes_to_one_hundred() {
        let mut ticker = ProgressTicker::spawn(
            Box::new(RandomizedProgress::new()),
            Duration::from_millis(5),
        );
        std::thread::sleep(Duration::from_millis(20));
        ticker.complete();
        assert_eq!(ticker.bar.position(), 100);
        ticker.collapse();
    }
}
