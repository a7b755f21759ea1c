//! Logging setup
//!
//! Installs a `tracing-subscriber` registry with one formatting layer and an
//! [`EnvFilter`]. `RUST_LOG`, when set, wins over the configured level.
//!
//! Initialisation is idempotent: a second call finds the global dispatcher
//! already installed and returns `Ok(())`, which keeps tests and embedders
//! from tripping over each other.
//!
//! # Example
//! ```no_run
//! use caselights::{config::Settings, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load()?;
//! logging::init_from_settings(&settings)?;
//! info!(port = ?settings.serial.port, "Starting");
//! # Ok(())
//! # }
//! ```

use crate::config::Settings;
use crate::error::{AppResult, LightError};
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Multi-line, colored (interactive use)
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// One JSON object per event (log shipping)
    Json,
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    /// Output layout
    pub format: OutputFormat,
    /// Include source file and line
    pub with_file_and_line: bool,
    /// Include thread names (the reader runs on its own thread)
    pub with_thread_names: bool,
    /// ANSI colors for the pretty layout
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::default(),
            with_file_and_line: false,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Options at `level` with default layout.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Options derived from the `application` section.
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        let level = parse_log_level(&settings.application.log_level).map_err(LightError::Configuration)?;
        let format =
            parse_output_format(&settings.application.log_format).map_err(LightError::Configuration)?;
        Ok(Self {
            level,
            format,
            ..Default::default()
        })
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Enable or disable file/line locations
    pub fn with_file_and_line(mut self, enabled: bool) -> Self {
        self.with_file_and_line = enabled;
        self
    }
}

/// Initialise logging from loaded settings.
pub fn init_from_settings(settings: &Settings) -> AppResult<()> {
    init(LoggingConfig::from_settings(settings)?)
}

/// Install the global subscriber. Returns `Ok(())` if one is already installed.
pub fn init(config: LoggingConfig) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let base = fmt::layer()
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line)
        .with_thread_names(config.with_thread_names);

    match config.format {
        OutputFormat::Pretty => install(base.pretty().with_ansi(config.with_ansi).with_filter(filter)),
        OutputFormat::Compact => install(base.compact().with_ansi(false).with_filter(filter)),
        OutputFormat::Json => install(base.json().with_filter(filter)),
    }
}

fn install<L>(layer: L) -> AppResult<()>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(()),
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(LightError::Configuration(format!(
            "Failed to initialise logging: {}",
            e
        ))),
    }
}

/// Parse a log level name, case-insensitively.
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

/// Parse a log format name, case-insensitively.
pub fn parse_output_format(format: &str) -> Result<OutputFormat, String> {
    match format.to_lowercase().as_str() {
        "pretty" => Ok(OutputFormat::Pretty),
        "compact" => Ok(OutputFormat::Compact),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!(
            "Invalid log format '{}'. Must be one of: pretty, compact, json",
            format
        )),
    }
}
