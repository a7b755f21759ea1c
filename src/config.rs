//! Configuration using Figment
//!
//! Settings are loaded from:
//! 1. `caselights.toml` in the user's config directory (or an explicit path)
//! 2. Environment variables prefixed with `CASELIGHTS_`, nested with `__`
//!
//! Every field has a default, so a missing or empty file is a valid
//! configuration.
//!
//! # Example
//! ```no_run
//! use caselights::config::Settings;
//!
//! # fn main() -> caselights::error::AppResult<()> {
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("Port: {:?}", settings.serial.port);
//! # Ok(())
//! # }
//! ```
//!
//! `CASELIGHTS_LIGHTING__BRIGHTNESS=0.5` overrides `lighting.brightness`.

use crate::audio::SpectrumAnalyzer;
use crate::error::{AppResult, LightError};
use crate::hardware::{SerialLinkBuilder, DEFAULT_BAUD_RATE};
use crate::protocol::FrameFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CASELIGHTS_";

/// File name looked up inside the config directory.
pub const CONFIG_FILE_NAME: &str = "caselights.toml";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Lighting link settings
    pub serial: SerialConfig,
    /// Dispatcher settings
    pub lighting: LightingConfig,
    /// Audio visualisation settings
    pub audio: AudioConfig,
    /// Telemetry probe settings
    pub stats: StatsConfig,
    /// Read-mode link settings
    pub gamepad: GamepadConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "caselights".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

/// Serial link for the lighting controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Stored device path, reopened on the next run
    pub port: Option<String>,
    /// Line speed
    pub baud_rate: u32,
    /// Read/write timeout in milliseconds
    pub timeout_ms: u64,
    /// Frame syntax understood by the firmware
    pub frame_format: FrameFormat,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 100,
            frame_format: FrameFormat::default(),
        }
    }
}

impl SerialConfig {
    /// Link builder preconfigured with these settings.
    pub fn link_builder(&self) -> SerialLinkBuilder {
        let builder = SerialLinkBuilder::new()
            .with_baud_rate(self.baud_rate)
            .with_timeout(Duration::from_millis(self.timeout_ms));
        match &self.port {
            Some(port) => builder.with_port_name(port.clone()),
            None => builder,
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Dispatch period in milliseconds
    pub tick_interval_ms: u64,
    /// Brightness scale in `[0, 1]`
    pub brightness: f64,
    /// Mode selected at startup (see `Mode` string syntax)
    pub mode: String,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            brightness: 1.0,
            mode: "off".to_string(),
        }
    }
}

impl LightingConfig {
    /// Dispatch period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Audio pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Loudness sensitivity factor (> 0)
    pub sensitivity: f32,
    /// Optional EMA decay in `[0, 1)` applied to the intensity
    pub smoothing: Option<f32>,
    /// Sample rate of the delivered PCM
    pub sample_rate: u32,
    /// Samples per delivered block
    pub block_len: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            smoothing: None,
            sample_rate: 48_000,
            block_len: 1024,
        }
    }
}

impl AudioConfig {
    /// Spectrum analyser sized for these settings.
    pub fn spectrum_analyzer(&self) -> SpectrumAnalyzer {
        SpectrumAnalyzer::new(self.block_len, self.sample_rate as f32)
    }
}

/// Telemetry probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Shell command printing the current value
    pub command: Option<String>,
    /// Lower bound of the value's domain
    pub domain_min: f64,
    /// Upper bound of the value's domain
    pub domain_max: f64,
    /// Poll period in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            command: None,
            domain_min: 0.0,
            domain_max: 100.0,
            poll_interval_ms: 1000,
        }
    }
}

/// Read-mode link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamepadConfig {
    /// Device path of the input controller
    pub port: Option<String>,
    /// Line speed
    pub baud_rate: u32,
    /// Sleep between polls when idle, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval_ms: 5,
        }
    }
}

impl Settings {
    /// Default configuration file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("caselights").join(CONFIG_FILE_NAME))
    }

    /// Load from the default location and the environment.
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(path),
            None => Self::figment(None).extract().map_err(LightError::from),
        }
    }

    /// Load from a specific file path and the environment. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(Some(path.as_ref()))
            .extract()
            .map_err(LightError::from)
    }

    fn figment(path: Option<&Path>) -> Figment {
        Self::figment_with_prefix(path, ENV_PREFIX)
    }

    fn figment_with_prefix(path: Option<&Path>, prefix: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(prefix).split("__"))
    }

    /// Write these settings to `path` as TOML, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| LightError::Configuration(format!("Cannot serialise settings: {}", e)))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(LightError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        crate::logging::parse_output_format(&self.application.log_format)
            .map_err(LightError::Configuration)?;

        if !(0.0..=1.0).contains(&self.lighting.brightness) {
            return Err(LightError::Configuration(format!(
                "Invalid brightness {}. Must be within 0.0-1.0",
                self.lighting.brightness
            )));
        }

        if self.lighting.tick_interval_ms == 0 {
            return Err(LightError::Configuration(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        self.lighting
            .mode
            .parse::<crate::mode::Mode>()
            .map_err(LightError::Configuration)?;

        if !(self.audio.sensitivity > 0.0 && self.audio.sensitivity.is_finite()) {
            return Err(LightError::Configuration(format!(
                "Invalid audio sensitivity {}. Must be positive",
                self.audio.sensitivity
            )));
        }

        if let Some(decay) = self.audio.smoothing {
            if !(0.0..1.0).contains(&decay) {
                return Err(LightError::Configuration(format!(
                    "Invalid audio smoothing {}. Must be within 0.0-1.0 (exclusive)",
                    decay
                )));
            }
        }

        if self.audio.block_len < 2 {
            return Err(LightError::Configuration(format!(
                "Invalid audio block_len {}. Must be at least 2",
                self.audio.block_len
            )));
        }

        if self.audio.sample_rate == 0 {
            return Err(LightError::Configuration(
                "audio sample_rate must be greater than 0".to_string(),
            ));
        }

        if self.stats.domain_min == self.stats.domain_max {
            return Err(LightError::DegenerateRange {
                min: self.stats.domain_min,
                max: self.stats.domain_max,
            });
        }

        if self.serial.baud_rate == 0 || self.gamepad.baud_rate == 0 {
            return Err(LightError::Configuration(
                "baud_rate must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
