use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_LIVE_INTERVAL_MS: u64 = 800;

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    backend_url: Option<String>,
    confidence: Option<f32>,
    live: Option<LiveConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct LiveConfigFile {
    device: Option<String>,
    interval_ms: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Client configuration: backend origin, detection confidence threshold, and
/// live capture settings. Loaded from an optional JSON file pointed at by
/// `ROADWATCH_CONFIG`, with per-field environment overrides.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    pub confidence: f32,
    pub live: LiveSettings,
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub device: String,
    pub interval: Duration,
    pub width: u32,
    pub height: u32,
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROADWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Self {
        let backend_url = file
            .backend_url
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let confidence = file.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        let live = LiveSettings {
            device: file
                .live
                .as_ref()
                .and_then(|live| live.device.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            interval: Duration::from_millis(
                file.live
                    .as_ref()
                    .and_then(|live| live.interval_ms)
                    .unwrap_or(DEFAULT_LIVE_INTERVAL_MS),
            ),
            width: file
                .live
                .as_ref()
                .and_then(|live| live.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .live
                .and_then(|live| live.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };
        Self {
            backend_url,
            confidence,
            live,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ROADWATCH_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend_url = url;
            }
        }
        if let Ok(confidence) = std::env::var("ROADWATCH_CONFIDENCE") {
            let value: f32 = confidence
                .parse()
                .map_err(|_| anyhow!("ROADWATCH_CONFIDENCE must be a number"))?;
            self.confidence = value;
        }
        if let Ok(device) = std::env::var("ROADWATCH_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.live.device = device;
            }
        }
        if let Ok(interval) = std::env::var("ROADWATCH_LIVE_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("ROADWATCH_LIVE_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.live.interval = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.backend_url)
            .map_err(|err| anyhow!("invalid backend url '{}': {}", self.backend_url, err))?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!("confidence must be within 0.0..=1.0"));
        }
        if self.live.interval.is_zero() {
            return Err(anyhow!("live interval must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
