//! Configuration for an annotation session.
//!
//! All session behaviour is controlled through [`SessionConfig`], built via
//! its [`SessionConfigBuilder`]. The defaults match a local deployment: the
//! conversion backend on port 5000 and the OCR service on port 8000.

use crate::error::CutlineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default horizontal distance (px) within which a pointer grabs a marker.
pub const DEFAULT_HIT_TOLERANCE_PX: f64 = 5.0;

/// Default maximum vertical gap between OCR tokens of the same text row.
pub const DEFAULT_LINE_GAP: f64 = 6.5;

/// Configuration for a [`crate::session::Session`].
///
/// # Example
/// ```rust
/// use cutlines::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .backend_url("http://localhost:5000")
///     .max_poll_attempts(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_poll_attempts, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL of the conversion backend (projects, images, upload, export).
    pub backend_url: String,

    /// Base URL of the OCR service (process, status, download).
    pub ocr_url: String,

    /// Row-grouping gap sent with every export. Default: 6.5.
    pub line_gap: f64,

    /// Name of the lines file the OCR job reads inside the project. Default: `lines.json`.
    pub json_filename: String,

    /// Delay between two status polls in milliseconds. Default: 2000.
    pub poll_interval_ms: u64,

    /// Number of status polls before giving up. Default: 180 (six minutes at 2 s).
    pub max_poll_attempts: u32,

    /// Per-request timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Pointer tolerance for grabbing an existing marker. Default: 5 px.
    pub hit_tolerance_px: f64,

    /// Directory where downloaded results are saved. Default: current directory.
    pub download_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".to_string(),
            ocr_url: "http://localhost:8000".to_string(),
            line_gap: DEFAULT_LINE_GAP,
            json_filename: "lines.json".to_string(),
            poll_interval_ms: 2000,
            max_poll_attempts: 180,
            request_timeout_secs: 60,
            hit_tolerance_px: DEFAULT_HIT_TOLERANCE_PX,
            download_dir: PathBuf::from("."),
        }
    }
}

impl SessionConfig {
    /// Create a new builder for `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = trim_base(url.into());
        self
    }

    pub fn ocr_url(mut self, url: impl Into<String>) -> Self {
        self.config.ocr_url = trim_base(url.into());
        self
    }

    pub fn line_gap(mut self, gap: f64) -> Self {
        self.config.line_gap = gap;
        self
    }

    pub fn json_filename(mut self, name: impl Into<String>) -> Self {
        self.config.json_filename = name.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_poll_attempts(mut self, n: u32) -> Self {
        self.config.max_poll_attempts = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn hit_tolerance_px(mut self, px: f64) -> Self {
        self.config.hit_tolerance_px = px;
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SessionConfig, CutlineError> {
        let c = &self.config;
        for (name, url) in [("backend", &c.backend_url), ("OCR", &c.ocr_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CutlineError::InvalidConfig(format!(
                    "{name} URL must start with http:// or https://, got '{url}'"
                )));
            }
        }
        if c.max_poll_attempts == 0 {
            return Err(CutlineError::InvalidConfig(
                "max poll attempts must be ≥ 1".into(),
            ));
        }
        if !c.line_gap.is_finite() || c.line_gap <= 0.0 {
            return Err(CutlineError::InvalidConfig(format!(
                "line gap must be a positive number, got {}",
                c.line_gap
            )));
        }
        if !c.hit_tolerance_px.is_finite() || c.hit_tolerance_px <= 0.0 {
            return Err(CutlineError::InvalidConfig(format!(
                "hit tolerance must be a positive number, got {}",
                c.hit_tolerance_px
            )));
        }
        if c.json_filename.trim().is_empty() {
            return Err(CutlineError::InvalidConfig(
                "json filename must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
