use serde::Deserialize;
use std::path::Path;

/// Largest accepted Gaussian blur kernel. Larger kernels cost more per frame
/// than one capture period allows.
pub const MAX_BLUR_KERNEL: u32 = 99;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Frame source: "test-pattern" or "http".
    #[serde(default = "default_source")]
    pub source: String,
    /// Snapshot URL polled by the "http" source.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// The reference camera is mounted upside down.
    #[serde(default = "default_rotate_180")]
    pub rotate_180: bool,
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_blur_kernel_size")]
    pub blur_kernel_size: u32,
    /// Regions smaller than this (in pixels) are ignored. Lower is more
    /// sensitive and more prone to false positives.
    #[serde(default = "default_min_contour_area")]
    pub min_contour_area: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_pacing_interval_ms")]
    pub pacing_interval_ms: u64,
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_enabled")]
    pub enabled: bool,
    #[serde(default = "default_snapshot_dir")]
    pub dir: String,
    #[serde(default = "default_snapshot_prefix")]
    pub prefix: String,
    #[serde(default = "default_clear_on_start")]
    pub clear_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            url: None,
            width: default_width(),
            height: default_height(),
            rotate_180: default_rotate_180(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: default_blur_kernel_size(),
            min_contour_area: default_min_contour_area(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_capture_interval_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            pacing_interval_ms: default_pacing_interval_ms(),
            jpeg_quality: default_quality(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: default_snapshot_enabled(),
            dir: default_snapshot_dir(),
            prefix: default_snapshot_prefix(),
            clear_on_start: default_clear_on_start(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let k = self.detector.blur_kernel_size;
        if k == 0 || k % 2 == 0 || k > MAX_BLUR_KERNEL {
            return Err(ConfigError::Invalid(format!(
                "detector.blur_kernel_size must be an odd integer in 1..={MAX_BLUR_KERNEL}, got {k}"
            )));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera.width, self.camera.height
            )));
        }
        if self.capture.interval_ms == 0 || self.stream.pacing_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "capture.interval_ms and stream.pacing_interval_ms must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "stream.jpeg_quality must be within 1..=100, got {}",
                self.stream.jpeg_quality
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_source() -> String {
    "test-pattern".into()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_rotate_180() -> bool {
    true
}
fn default_capture_timeout_ms() -> u64 {
    2000
}
fn default_blur_kernel_size() -> u32 {
    11
}
fn default_min_contour_area() -> u32 {
    300
}
fn default_capture_interval_ms() -> u64 {
    200
}
fn default_bind() -> String {
    "0.0.0.0:8080".into()
}
fn default_pacing_interval_ms() -> u64 {
    100
}
fn default_quality() -> u8 {
    80
}
fn default_snapshot_enabled() -> bool {
    true
}
fn default_snapshot_dir() -> String {
    ".".into()
}
fn default_snapshot_prefix() -> String {
    "motion_".into()
}
fn default_clear_on_start() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.camera.source, "test-pattern");
        assert_eq!(config.detector.blur_kernel_size, 11);
        assert_eq!(config.detector.min_contour_area, 300);
        assert_eq!(config.capture.interval_ms, 200);
        assert_eq!(config.stream.pacing_interval_ms, 100);
        assert_eq!(config.snapshot.prefix, "motion_");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = Config::parse(
            r#"
            [camera]
            source = "http"
            url = "http://cam.local/snapshot.jpg"

            [detector]
            min_contour_area = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.camera.source, "http");
        assert_eq!(config.camera.url.as_deref(), Some("http://cam.local/snapshot.jpg"));
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.detector.min_contour_area, 10);
        assert_eq!(config.detector.blur_kernel_size, 11);
    }

    #[test]
    fn even_kernel_rejected() {
        let err = Config::parse("[detector]\nblur_kernel_size = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn oversized_kernel_rejected() {
        let err = Config::parse("[detector]\nblur_kernel_size = 101\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(Config::parse("[detector]\nblur_kernel_size = 99\n").is_ok());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Config::parse("[camera\nsource = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
