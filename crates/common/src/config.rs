//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KmsgrabError, KmsgrabResult};

/// Default location of the daemon control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/kmsgrab.sock";

/// Default JPEG quality factor.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture defaults.
    pub capture: CaptureDefaults,

    /// Daemon defaults.
    pub daemon: DaemonDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Resampling filter used when the output size differs from the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleFilter {
    /// Point sampling. Fast, blocky when upscaling.
    #[default]
    Nearest,
    /// 16.16 fixed-point bilinear interpolation.
    Bilinear,
}

/// Default capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Directory holding the DRM card nodes.
    pub device_dir: PathBuf,

    /// Highest number of `cardN` nodes probed.
    pub max_cards: u32,

    /// JPEG quality factor (1-100).
    pub jpeg_quality: u8,

    /// Resampling filter.
    pub filter: ScaleFilter,
}

/// Default daemon parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonDefaults {
    /// Unix socket the daemon listens on.
    pub socket_path: PathBuf,

    /// Pending GRAB requests held while a capture runs.
    pub queue_depth: usize,

    /// Largest command accepted from a client, in bytes.
    pub max_command_len: usize,

    /// Output path used when none is given on the command line.
    pub output: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "kmsgrab=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev/dri"),
            max_cards: 16,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            filter: ScaleFilter::Nearest,
        }
    }
}

impl Default for DaemonDefaults {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            queue_depth: 4,
            max_command_len: 128,
            output: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if !config_path.exists() {
            return Self::default();
        }
        match Self::try_load_from(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config at {:?}: {}", config_path, e);
                Self::default()
            }
        }
    }

    /// Load config from a path that must exist and parse.
    pub fn try_load_from(config_path: &Path) -> KmsgrabResult<Self> {
        if !config_path.is_file() {
            return Err(KmsgrabError::config(format!(
                "no config file at {}",
                config_path.display()
            )));
        }
        let content = std::fs::read_to_string(config_path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config.sanitized())
    }

    /// Clamp out-of-range values to something usable.
    fn sanitized(mut self) -> Self {
        self.capture.jpeg_quality = clamp_jpeg_quality(self.capture.jpeg_quality.into());
        self.daemon.queue_depth = self.daemon.queue_depth.max(1);
        self.daemon.max_command_len = self.daemon.max_command_len.max(4);
        self
    }
}

/// Clamp a requested JPEG quality into `1..=100`.
pub fn clamp_jpeg_quality(requested: u32) -> u8 {
    let clamped = requested.clamp(1, 100);
    if clamped != requested {
        tracing::warn!(requested, clamped, "JPEG quality out of range, clamping");
    }
    clamped as u8
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("kmsgrab").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_contract() {
        let config = AppConfig::default();
        assert_eq!(config.capture.jpeg_quality, 90);
        assert_eq!(config.capture.filter, ScaleFilter::Nearest);
        assert_eq!(config.daemon.socket_path, PathBuf::from("/tmp/kmsgrab.sock"));
        assert_eq!(config.daemon.max_command_len, 128);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "capture": { "filter": "bilinear", "jpeg_quality": 250 } }"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.capture.filter, ScaleFilter::Bilinear);
        assert_eq!(config.capture.jpeg_quality, 100);
        assert_eq!(config.capture.device_dir, PathBuf::from("/dev/dri"));
        assert_eq!(config.daemon.queue_depth, 4);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.capture.jpeg_quality, DEFAULT_JPEG_QUALITY);
    }

    #[test]
    fn test_strict_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::try_load_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, KmsgrabError::Config { .. }));
        assert_eq!(err.reply_reason(), "configuration error");
    }

    #[test]
    fn test_strict_load_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::try_load_from(&path).unwrap_err();
        assert!(matches!(err, KmsgrabError::Json(_)));
    }

    #[test]
    fn test_strict_load_reports_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let err = AppConfig::try_load_from(&path).unwrap_err();
        assert!(matches!(err, KmsgrabError::Io(_)));
    }

    #[test]
    fn test_clamp_jpeg_quality() {
        assert_eq!(clamp_jpeg_quality(0), 1);
        assert_eq!(clamp_jpeg_quality(55), 55);
        assert_eq!(clamp_jpeg_quality(1000), 100);
    }
}
