//! Custom error types for the application.
//!
//! This module defines the primary error type, `LightError`, shared by the serial link,
//! the value mapper, the dispatcher and the configuration layer. Using the `thiserror`
//! crate keeps every failure a typed, matchable variant.
//!
//! ## Error Hierarchy
//!
//! - **`PortUnavailable`**: the device path is missing or already claimed by another
//!   process. Fatal to that open attempt; recoverable by re-enumerating and retrying.
//! - **`AlreadyOpen` / `NotOpen`**: API misuse of a `SerialLink`. Correct callers never
//!   see these.
//! - **`WriteFailed` / `ReadFailed`**: an OS-level I/O error in the middle of a transfer.
//!   After a write failure the link stays open; the caller decides whether to reopen.
//!   The read loop treats a read failure as a disconnect.
//! - **`DegenerateRange`**: a remap was asked to use a domain with `min == max`.
//! - **`Config` / `Configuration`**: parse errors from `figment` and semantic validation
//!   errors respectively.
//!
//! Nothing in the library terminates the process; every variant is surfaced to the
//! orchestration layer, which decides how to recover.

use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type AppResult<T> = std::result::Result<T, LightError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum LightError {
    #[error("Serial port '{port}' is unavailable: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial port is already open")]
    AlreadyOpen,

    #[error("Serial port not open")]
    NotOpen,

    #[error("Serial write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Serial read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Port discovery failed: {0}")]
    Discovery(String),

    #[error("Degenerate source range [{min}, {max}]")]
    DegenerateRange { min: f64, max: f64 },

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Stats probe error: {0}")]
    Probe(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for LightError {
    fn from(value: figment::Error) -> Self {
        LightError::Config(Box::new(value))
    }
}
