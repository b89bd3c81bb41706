//! HTTP contract with the detection backend.
//!
//! The backend exposes two endpoints:
//! - `POST /detect/image` - multipart `file` field, `confidence` query param
//! - `POST /detect/video` - same shape for video payloads
//!
//! Both respond with JSON: `{ "image_url" | "video_url": string, "counts":
//! { "pothole", "plastic", "otherlitter" } }`, or `{ "error": string }` when
//! processing failed after transport succeeded. Returned media references are
//! resolved against the configured backend origin and must be treated as
//! cache-bypassed: callers append a uniqueness token when refetching the same
//! logical path (the live loop refetches continuously).

mod multipart;

pub use multipart::MultipartBody;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

const MAX_MEDIA_BYTES: usize = 64 * 1024 * 1024;

/// Per-category detection tally returned by the backend for one call.
///
/// Counts fully replace whatever was displayed before; there is no
/// accumulation across requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionCounts {
    pub pothole: u64,
    pub plastic: u64,
    pub otherlitter: u64,
}

/// One successful detection response: where the annotated output lives and
/// what was counted in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionResult {
    /// Media reference as returned by the backend (usually origin-relative).
    pub media_url: String,
    pub counts: DetectionCounts,
}

/// Failure classes at the request boundary.
///
/// `Transport` covers everything that kept a structured response from
/// arriving: connection failures, rejected statuses, malformed bodies.
/// `Backend` means transport succeeded but the response body itself reported
/// a processing error; this class is surfaced to the user distinctly.
#[derive(Clone, Debug)]
pub enum DetectError {
    Transport { message: String },
    Backend { message: String },
}

impl DetectError {
    fn transport(message: impl Into<String>) -> Self {
        DetectError::Transport {
            message: message.into(),
        }
    }

    fn backend(message: impl Into<String>) -> Self {
        DetectError::Backend {
            message: message.into(),
        }
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, DetectError::Backend { .. })
    }
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectError::Transport { message } => write!(f, "transport error: {}", message),
            DetectError::Backend { message } => write!(f, "backend error: {}", message),
        }
    }
}

impl std::error::Error for DetectError {}

/// Wire shape of a detection response. The backend uses one field name per
/// media kind and omits the rest, so everything is optional here.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    counts: Option<DetectionCounts>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the detection backend.
///
/// Cheap to clone; the underlying agent shares its connection pool.
#[derive(Clone)]
pub struct DetectClient {
    agent: ureq::Agent,
    origin: Url,
}

impl DetectClient {
    pub fn new(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin)
            .with_context(|| format!("parse backend origin '{}'", origin))?;
        Ok(Self {
            agent: ureq::AgentBuilder::new().build(),
            origin,
        })
    }

    /// Submit image bytes for detection.
    pub fn detect_image(
        &self,
        bytes: &[u8],
        file_name: &str,
        confidence: f32,
    ) -> Result<DetectionResult, DetectError> {
        self.submit("/detect/image", bytes, file_name, "image/jpeg", confidence)
    }

    /// Submit video bytes for detection.
    pub fn detect_video(
        &self,
        bytes: &[u8],
        file_name: &str,
        confidence: f32,
    ) -> Result<DetectionResult, DetectError> {
        self.submit("/detect/video", bytes, file_name, "video/mp4", confidence)
    }

    fn submit(
        &self,
        path: &str,
        bytes: &[u8],
        file_name: &str,
        content_type: &str,
        confidence: f32,
    ) -> Result<DetectionResult, DetectError> {
        let mut body = MultipartBody::new();
        body.add_file("file", file_name, content_type, bytes);
        let body_content_type = body.content_type();
        let payload = body.finish();

        let mut url = self
            .origin
            .join(path)
            .map_err(|err| DetectError::transport(format!("build request url: {}", err)))?;
        url.query_pairs_mut()
            .append_pair("confidence", &confidence.to_string());

        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", &body_content_type)
            .send_bytes(&payload);

        let text = match response {
            Ok(response) => response
                .into_string()
                .map_err(|err| DetectError::transport(format!("read response body: {}", err)))?,
            Err(ureq::Error::Status(code, response)) => {
                // Rejected statuses may still carry a structured error body.
                let body = response.into_string().unwrap_or_default();
                if let Ok(parsed) = serde_json::from_str::<DetectResponse>(&body) {
                    if let Some(error) = parsed.error {
                        return Err(DetectError::backend(error));
                    }
                }
                return Err(DetectError::transport(format!(
                    "backend rejected request with status {}",
                    code
                )));
            }
            Err(err) => return Err(DetectError::transport(err.to_string())),
        };

        let parsed: DetectResponse = serde_json::from_str(&text)
            .map_err(|err| DetectError::transport(format!("malformed response: {}", err)))?;
        if let Some(error) = parsed.error {
            return Err(DetectError::backend(error));
        }
        let media_url = parsed
            .image_url
            .or(parsed.video_url)
            .ok_or_else(|| DetectError::transport("response missing media reference"))?;
        let counts = parsed
            .counts
            .ok_or_else(|| DetectError::transport("response missing counts"))?;

        Ok(DetectionResult { media_url, counts })
    }

    /// Resolve a backend media reference against the configured origin.
    /// Absolute references pass through unchanged.
    pub fn resolve(&self, media_url: &str) -> Result<Url> {
        self.origin
            .join(media_url)
            .with_context(|| format!("resolve media reference '{}'", media_url))
    }

    /// Resolve a media reference and append a uniqueness token so repeated
    /// fetches of the same logical path bypass any cache in between.
    pub fn cache_busted(&self, media_url: &str) -> Result<String> {
        let mut url = self.resolve(media_url)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock before epoch")?
            .as_millis();
        url.query_pairs_mut()
            .append_pair("t", &millis.to_string());
        Ok(url.into())
    }

    /// Fetch the annotated media the backend rendered for a detection call.
    /// Always cache-busted; the live loop refetches the same path per frame.
    pub fn fetch_annotated(&self, media_url: &str) -> Result<Vec<u8>> {
        let url = self.cache_busted(media_url)?;
        let response = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("fetch annotated media from {}", url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_MEDIA_BYTES as u64)
            .read_to_end(&mut bytes)
            .context("read annotated media")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty annotated media response"));
        }
        Ok(bytes)
    }

    /// Probe a processed video reference and log its lifecycle findings.
    ///
    /// Diagnostics only: the detection request already completed, so nothing
    /// here alters pipeline state regardless of what the probe observes.
    pub fn probe_playback(&self, media_url: &str) {
        let url = match self.resolve(media_url) {
            Ok(url) => url,
            Err(err) => {
                log::error!("video playback probe skipped: {}", err);
                return;
            }
        };
        log::info!("video load start: {}", url);
        match self
            .agent
            .get(url.as_str())
            .set("Range", "bytes=0-65535")
            .call()
        {
            Ok(response) => {
                let content_type = response
                    .header("Content-Type")
                    .unwrap_or("unknown")
                    .to_string();
                let mut probed = Vec::new();
                let read = response
                    .into_reader()
                    .take(64 * 1024)
                    .read_to_end(&mut probed);
                match read {
                    Ok(0) => log::warn!("video stream stalled: empty body from {}", url),
                    Ok(n) => log::info!(
                        "video ready: content-type={}, {} bytes probed",
                        content_type,
                        n
                    ),
                    Err(err) => log::warn!("video stream stalled mid-read: {}", err),
                }
            }
            Err(err) => log::error!("video playback error for {}: {}", url, err),
        }
    }
}
