//! Configuration management for winmirror

use crate::input::InputConfig;
use crate::viewport::{LayoutConfig, ViewportSize};
use crate::window::EnumerateOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Highest X pointer button number accepted for forwarded clicks
const MAX_BUTTON: u8 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display configuration
    pub display: DisplayConfig,

    /// Capture configuration
    pub capture: CaptureConfig,

    /// Viewer layout
    pub layout: LayoutConfig,

    /// Input forwarding
    pub input: InputConfig,

    /// Window enumeration filters
    pub enumerate: EnumerateOptions,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// X display to open (e.g. ":0"); `$DISPLAY` when unset
    pub name: Option<String>,

    /// Viewer width in pixels
    pub viewport_width: u32,

    /// Viewer height in pixels
    pub viewport_height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            name: None,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

impl DisplayConfig {
    pub fn viewport(&self) -> ViewportSize {
        ViewportSize::new(self.viewport_width, self.viewport_height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Deadline for one raw-buffer fetch
    pub fetch_timeout_ms: u64,

    /// Skip surface uploads when the frame content did not change
    pub skip_unchanged: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 500,
            skip_unchanged: true,
        }
    }
}

impl CaptureConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.display.viewport_width == 0 || self.display.viewport_height == 0 {
            return Err("Viewport dimensions must be non-zero".into());
        }

        if self.capture.fetch_timeout_ms == 0 {
            return Err("Capture fetch_timeout_ms must be non-zero".into());
        }

        if self.layout.grid_rows == 0 {
            return Err("Layout grid_rows must be at least 1".into());
        }

        if !(self.layout.panel_ratio > 0.0 && self.layout.panel_ratio <= 1.0) {
            return Err("Layout panel_ratio must be in (0, 1]".into());
        }

        // a seam must leave something of the cell
        if !(0.0..1.0).contains(&self.layout.cell_gap) {
            return Err("Layout cell_gap must be in [0, 1)".into());
        }

        if self.input.button == 0 || self.input.button > MAX_BUTTON {
            return Err(format!("Input button must be between 1 and {}", MAX_BUTTON).into());
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(format!("Unknown logging level \"{}\"", self.logging.level).into());
        }

        Ok(())
    }
}
