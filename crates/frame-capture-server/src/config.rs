//! Configuration loading and parsing.
//!
//! Defines the TOML schema and resolves it into the immutable settings the
//! server threads into every session.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default bind address when neither config nor CLI provides one.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
/// Default output root for session directories and videos.
pub const DEFAULT_OUTPUT_DIR: &str = "./recordings";
/// Default websocket frame limit; base64 PNG frames easily exceed the codec default.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port). Takes precedence over `port`.
    pub bind: Option<String>,
    /// Listening port on all interfaces.
    pub port: Option<u16>,
    /// Root directory for session frame directories and finished videos.
    pub output_dir: Option<String>,
    /// Maximum accepted websocket message size in bytes.
    pub max_frame_bytes: Option<usize>,
    /// External encoder settings.
    pub encoder: Option<EncoderConfig>,
}

/// Encoder section of the TOML config.
#[derive(Debug, Default, Deserialize)]
pub struct EncoderConfig {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_path: Option<String>,
    /// Path or name of the ImageMagick `identify` binary.
    pub identify_path: Option<String>,
    /// Output frame rate.
    pub frame_rate: Option<u32>,
    /// Video codec passed to `-c:v`.
    pub codec: Option<String>,
    /// Constant rate factor (0-51).
    pub crf: Option<u8>,
    /// Pixel format; an empty string omits `-pix_fmt`.
    pub pixel_format: Option<String>,
    /// Probe the first frame for its size before encoding.
    pub probe_dimensions: Option<bool>,
    /// Upper bound for each external process run.
    pub timeout_secs: Option<u64>,
}

/// Resolved encoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub ffmpeg_path: PathBuf,
    pub identify_path: PathBuf,
    pub frame_rate: u32,
    pub codec: String,
    pub crf: u8,
    pub pixel_format: Option<String>,
    pub probe_dimensions: bool,
    pub timeout: Duration,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            identify_path: PathBuf::from("identify"),
            frame_rate: 30,
            codec: "libx264".to_string(),
            crf: 23,
            pixel_format: Some("yuv420p".to_string()),
            probe_dimensions: true,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Fully resolved settings shared by the server and every session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub bind: SocketAddr,
    pub output_dir: PathBuf,
    pub max_frame_bytes: usize,
    pub encoder: EncoderSettings,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Parse an optional bind address from config; `bind` wins over `port`.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<Option<SocketAddr>> {
    if let Some(bind) = cfg.bind.as_deref() {
        let addr = bind.parse().with_context(|| format!("parse bind {bind}"))?;
        return Ok(Some(addr));
    }
    Ok(cfg
        .port
        .map(|port| SocketAddr::from(([0, 0, 0, 0], port))))
}

/// Extract the output root from config, falling back to the default.
pub fn output_dir_from_config(cfg: &ServerConfig) -> PathBuf {
    cfg.output_dir
        .as_deref()
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

/// Extract the websocket message limit.
pub fn max_frame_bytes_from_config(cfg: &ServerConfig) -> Result<usize> {
    match cfg.max_frame_bytes {
        Some(0) => Err(anyhow::anyhow!("max_frame_bytes must be greater than zero")),
        Some(limit) => Ok(limit),
        None => Ok(DEFAULT_MAX_FRAME_BYTES),
    }
}

/// Resolve encoder settings, applying defaults for missing keys.
pub fn encoder_from_config(cfg: &ServerConfig) -> Result<EncoderSettings> {
    let defaults = EncoderSettings::default();
    let Some(enc) = cfg.encoder.as_ref() else {
        return Ok(defaults);
    };

    let frame_rate = enc.frame_rate.unwrap_or(defaults.frame_rate);
    if frame_rate == 0 {
        return Err(anyhow::anyhow!("encoder.frame_rate must be greater than zero"));
    }
    let crf = enc.crf.unwrap_or(defaults.crf);
    if crf > 51 {
        return Err(anyhow::anyhow!("encoder.crf must be within 0..=51, got {crf}"));
    }
    let timeout_secs = enc.timeout_secs.unwrap_or(defaults.timeout.as_secs());
    if timeout_secs == 0 {
        return Err(anyhow::anyhow!("encoder.timeout_secs must be greater than zero"));
    }
    let pixel_format = match enc.pixel_format.as_deref().map(str::trim) {
        Some("") => None,
        Some(fmt) => Some(fmt.to_string()),
        None => defaults.pixel_format,
    };

    Ok(EncoderSettings {
        ffmpeg_path: enc
            .ffmpeg_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or(defaults.ffmpeg_path),
        identify_path: enc
            .identify_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or(defaults.identify_path),
        frame_rate,
        codec: enc.codec.clone().unwrap_or(defaults.codec),
        crf,
        pixel_format,
        probe_dimensions: enc.probe_dimensions.unwrap_or(defaults.probe_dimensions),
        timeout: Duration::from_secs(timeout_secs),
    })
}
