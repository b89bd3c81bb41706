//! roadwatch - road hazard detection client
//!
//! This crate implements the client-side inference-request pipeline for a
//! remote road-hazard detection service (potholes, plastic, other litter).
//! Media is submitted over HTTP as multipart uploads; the backend returns a
//! reference to the server-rendered annotated output plus per-category counts.
//!
//! # Architecture
//!
//! - `client`: HTTP contract with the detection backend (multipart upload,
//!   response decoding, error taxonomy)
//! - `ui`: mode controller and result surfaces (one visible surface at a time)
//! - `progress`: cosmetic progress estimation shown while a request is pending
//! - `pipeline`: one-shot submission lifecycle for image and video uploads
//! - `capture`: camera frame sources (V4L2 devices, synthetic stub)
//! - `live`: continuous capture -> encode -> submit -> render loop
//!
//! The crate is synchronous. Background work (the progress ticker, the live
//! capture loop) runs on worker threads owned by guard or session objects and
//! is stopped through atomic flags; no work outlives its owner.

pub mod capture;
pub mod client;
pub mod config;
pub mod live;
pub mod pipeline;
pub mod progress;
pub mod ui;

pub use capture::{CameraConfig, CameraSource, CapturedFrame};
pub use client::{DetectClient, DetectError, DetectionCounts, DetectionResult};
pub use config::{ClientConfig, LiveSettings};
pub use live::{LiveConfig, LiveSession, LiveStats};
pub use pipeline::{Pipeline, PipelineTiming, SubmitGate};
pub use progress::{ProgressStrategy, ProgressTicker, RandomizedProgress, TimeBasedProgress};
pub use ui::{Mode, UiState};
