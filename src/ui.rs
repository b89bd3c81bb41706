//! Mode controller and result surfaces.
//!
//! `UiState` is the explicit home for what a browser client would scatter
//! across shared DOM elements: which capture mode is active, which result
//! surface is visible, what each surface points at, and the three category
//! counters. Its methods are the only mutators, so every pipeline renders
//! through the same two entry points: `switch_mode` and `apply_result`.
//!
//! Invariant: at most one result surface is visible at any time.

use crate::client::{DetectionCounts, DetectionResult};

/// The exclusive active capture/submission context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Image,
    Video,
    Live,
}

/// A display surface holding a media reference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Surface {
    pub visible: bool,
    pub source: Option<String>,
}

/// The canvas surface the live loop draws decoded annotated frames onto.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CanvasSurface {
    pub visible: bool,
    pub width: u32,
    pub height: u32,
    /// Reference of the last frame drawn.
    pub source: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct UiState {
    mode: Mode,
    image: Surface,
    video: Surface,
    canvas: CanvasSurface,
    counts: DetectionCounts,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the active mode, resetting all transient result state: every
    /// surface is hidden, image and video sources are cleared, and the three
    /// counters read zero. Idempotent; returns the previous mode so callers
    /// owning a live session can stop it when leaving `Mode::Live`.
    pub fn switch_mode(&mut self, target: Mode) -> Mode {
        let previous = self.mode;
        self.image = Surface::default();
        self.video = Surface::default();
        self.canvas.visible = false;
        self.canvas.source = None;
        self.counts = DetectionCounts::default();
        self.mode = target;
        previous
    }

    /// Apply a detection response to the surface matching the submitting
    /// mode and overwrite the counters wholesale. The two other surfaces are
    /// hidden, preserving the single-visible-surface invariant.
    pub fn apply_result(&mut self, mode: Mode, result: &DetectionResult) {
        match mode {
            Mode::Image => {
                self.image.source = Some(result.media_url.clone());
                self.image.visible = true;
                self.video.visible = false;
                self.canvas.visible = false;
            }
            Mode::Video => {
                self.video.source = Some(result.media_url.clone());
                self.video.visible = true;
                self.image.visible = false;
                self.canvas.visible = false;
            }
            Mode::Live => {
                self.canvas.source = Some(result.media_url.clone());
                self.canvas.visible = true;
                self.image.visible = false;
                self.video.visible = false;
            }
        }
        self.counts = result.counts;
    }

    /// Size the live canvas to the decoded annotated frame.
    pub fn size_canvas(&mut self, width: u32, height: u32) {
        self.canvas.width = width;
        self.canvas.height = height;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn counts(&self) -> DetectionCounts {
        self.counts
    }

    pub fn image_surface(&self) -> &Surface {
        &self.image
    }

    pub fn video_surface(&self) -> &Surface {
        &self.video
    }

    pub fn canvas_surface(&self) -> &CanvasSurface {
        &self.canvas
    }

    /// Number of currently visible result surfaces. Zero before any result,
    /// never more than one.
    pub fn visible_surfaces(&self) -> usize {
        [
            self.image.visible,
            self.video.visible,
            self.canvas.visible,
        ]
        .iter()
        .filter(|visible| **visible)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(media_url: &str) -> DetectionResult {
        DetectionResult {
            media_url: media_url.to_string(),
            counts: DetectionCounts {
                pothole: 2,
                plastic: 0,
                otherlitter: 1,
            },
        }
    }

    #[test]
    fn switch_mode_resets_surfaces_and_counters() {
        let mut ui = UiState::new();
        ui.apply_result(Mode::Image, &sample_result("/out/1.jpg"));
        assert_eq!(ui.counts().pothole, 2);

        ui.switch_mode(Mode::Video);

        assert_eq!(ui.mode(), Mode::Video);
        assert_eq!(ui.visible_surfaces(), 0);
        assert_eq!(ui.image_surface().source, None);
        assert_eq!(ui.video_surface().source, None);
        assert_eq!(ui.counts(), DetectionCounts::default());
    }

    #[test]
    fn switch_mode_is_idempotent() {
        let mut ui = UiState::new();
        ui.switch_mode(Mode::Live);
        let snapshot = ui.clone();
        ui.switch_mode(Mode::Live);
        assert_eq!(ui.mode(), snapshot.mode());
        assert_eq!(ui.visible_surfaces(), snapshot.visible_surfaces());
        assert_eq!(ui.counts(), snapshot.counts());
    }

    #[test]
    fn switch_mode_reports_previous_mode() {
        let mut ui = UiState::new();
        ui.switch_mode(Mode::Live);
        let previous = ui.switch_mode(Mode::Image);
        assert_eq!(previous, Mode::Live);
    }

    #[test]
    fn apply_result_shows_exactly_one_surface() {
        let mut ui = UiState::new();
        for mode in [Mode::Image, Mode::Video, Mode::Live] {
            ui.apply_result(mode, &sample_result("/out/1.jpg"));
            assert_eq!(ui.visible_surfaces(), 1, "mode {:?}", mode);
        }
        assert!(ui.canvas_surface().visible);
        assert!(!ui.image_surface().visible);
    }

    #[test]
    fn apply_result_replaces_counts_without_accumulation() {
        let mut ui = UiState::new();
        ui.apply_result(Mode::Image, &sample_result("/out/1.jpg"));
        ui.apply_result(Mode::Image, &sample_result("/out/2.jpg"));
        assert_eq!(ui.counts().pothole, 2);
        assert_eq!(ui.counts().otherlitter, 1);
        assert_eq!(ui.image_surface().source.as_deref(), Some("/out/2.jpg"));
    }
}
