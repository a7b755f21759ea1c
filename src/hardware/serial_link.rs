//! Serial Link
//!
//! Owns at most one OS serial handle and exposes the line-oriented operations
//! the rest of the crate needs: discovery, exclusive open/close, full writes,
//! and (for read mode) a readiness check plus a read-one-token operation.
//!
//! State machine: `Closed -> Open -> Closed`. Every I/O call fails fast with
//! [`LightError::NotOpen`] while closed.

use crate::error::{AppResult, LightError};
use crate::hardware::capabilities::{FrameWriter, TokenSource};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Baud rate the lighting firmware expects.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Longest inbound token kept while waiting for its terminator.
const MAX_TOKEN_LEN: usize = 256;

/// A discoverable serial device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Human readable name (USB product string when available)
    pub name: String,
    /// Device path to pass to [`SerialLink::open_port`]
    pub path: String,
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.path {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{} ({})", self.name, self.path)
        }
    }
}

/// Enumerate serial devices currently known to the OS.
///
/// Freshly enumerated on every call; never touches any open connection.
pub fn list_ports() -> AppResult<Vec<PortDescriptor>> {
    let ports = serialport::available_ports().map_err(|e| LightError::Discovery(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|info| {
            let name = match &info.port_type {
                SerialPortType::UsbPort(usb) => match (&usb.manufacturer, &usb.product) {
                    (Some(vendor), Some(product)) => format!("{} {}", vendor, product),
                    (None, Some(product)) => product.clone(),
                    _ => info.port_name.clone(),
                },
                _ => info.port_name.clone(),
            };
            PortDescriptor {
                name,
                path: info.port_name,
            }
        })
        .collect())
}

/// Builder for [`SerialLink`] with custom line settings.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use caselights::hardware::SerialLinkBuilder;
///
/// let link = SerialLinkBuilder::new()
///     .with_baud_rate(57_600)
///     .with_timeout(Duration::from_millis(50))
///     .build();
/// assert!(!link.is_open());
/// ```
#[derive(Debug, Clone)]
pub struct SerialLinkBuilder {
    baud_rate: u32,
    timeout: Duration,
    port_name: Option<String>,
}

impl SerialLinkBuilder {
    /// Defaults: 115200 baud, 8N1, 100 ms I/O timeout, no stored port.
    pub fn new() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
            port_name: None,
        }
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the per-call read/write timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Remember a port to open later with [`SerialLink::reopen`].
    pub fn with_port_name(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = Some(port_name.into());
        self
    }

    /// Build a closed link.
    pub fn build(self) -> SerialLink {
        SerialLink {
            port_name: self.port_name,
            baud_rate: self.baud_rate,
            timeout: self.timeout,
            port: None,
            pending: Vec::new(),
        }
    }
}

impl Default for SerialLinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One serial connection to the lighting (or gamepad) controller.
pub struct SerialLink {
    /// Last port opened or selected (e.g. "/dev/ttyUSB0", "COM3")
    port_name: Option<String>,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
    /// Bytes received after the last complete token
    pending: Vec<u8>,
}

impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialLink {
    /// A closed link with default line settings.
    pub fn new() -> Self {
        SerialLinkBuilder::new().build()
    }

    /// The stored port name, if any.
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Open `path` exclusively and configure it for the firmware (8N1, no flow control).
    ///
    /// Fails with `AlreadyOpen` if this link already holds a handle, and with
    /// `PortUnavailable` if the device is missing or claimed by another process.
    pub fn open_port(&mut self, path: &str) -> AppResult<()> {
        if self.port.is_some() {
            return Err(LightError::AlreadyOpen);
        }

        let port = serialport::new(path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.timeout)
            .open()
            .map_err(|source| LightError::PortUnavailable {
                port: path.to_string(),
                source,
            })?;

        self.port = Some(port);
        self.port_name = Some(path.to_string());
        self.pending.clear();
        info!(port = %path, baud = self.baud_rate, "Serial port opened");
        Ok(())
    }

    /// Open the stored port name.
    pub fn reopen(&mut self) -> AppResult<()> {
        let path = self.port_name.clone().ok_or_else(|| LightError::PortUnavailable {
            port: String::new(),
            source: serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                "no serial port selected",
            ),
        })?;
        self.open_port(&path)
    }

    /// Release the OS handle. Calling this while closed is a no-op.
    pub fn close_port(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush() {
                debug!(port = ?self.port_name, error = %e, "Flush before close failed");
            }
            self.pending.clear();
            debug!(port = ?self.port_name, "Serial port closed");
        }
    }

    /// Whether a handle is currently held.
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Non-blocking check for pending input. Does not consume anything.
    pub fn has_data(&mut self) -> AppResult<bool> {
        let port = self.port.as_mut().ok_or(LightError::NotOpen)?;
        if self.pending.contains(&b'\n') {
            return Ok(true);
        }
        let waiting = port
            .bytes_to_read()
            .map_err(|e| LightError::ReadFailed(e.into()))?;
        Ok(waiting > 0)
    }

    /// Write all of `text`, retrying short writes until done or a hard error occurs.
    pub fn send_string(&mut self, text: &str) -> AppResult<()> {
        let port = self.port.as_mut().ok_or(LightError::NotOpen)?;

        let mut remaining = text.as_bytes();
        while !remaining.is_empty() {
            match port.write(remaining) {
                Ok(0) => {
                    return Err(LightError::WriteFailed(ErrorKind::WriteZero.into()));
                }
                Ok(n) => remaining = &remaining[n..],
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(LightError::WriteFailed(e)),
            }
        }
        port.flush().map_err(LightError::WriteFailed)?;

        trace!(frame = %text.escape_default(), "Sent serial command");
        Ok(())
    }

    /// Read one newline-terminated token.
    ///
    /// Returns `Ok(None)` when the read timeout passes before a full line is
    /// available, even if bytes keep arriving. Partial input is kept for the
    /// next call. End-of-stream is reported as a read failure.
    pub fn read_token(&mut self) -> AppResult<Option<String>> {
        let port = self.port.as_mut().ok_or(LightError::NotOpen)?;
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(token) = take_line(&mut self.pending) {
                return Ok(Some(token));
            }

            let mut chunk = [0u8; 64];
            match port.read(&mut chunk) {
                Ok(0) => {
                    return Err(LightError::ReadFailed(ErrorKind::UnexpectedEof.into()));
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if self.pending.len() > MAX_TOKEN_LEN && !self.pending.contains(&b'\n') {
                        debug!(len = self.pending.len(), "Discarding oversized partial token");
                        self.pending.clear();
                    }
                    if Instant::now() >= deadline && !self.pending.contains(&b'\n') {
                        return Ok(None);
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(LightError::ReadFailed(e)),
            }
        }
    }
}

impl Default for SerialLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close_port();
    }
}

/// Split the first complete line off `buf`, without its terminator.
fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buf.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line).trim().to_string())
}

impl FrameWriter for SerialLink {
    fn send_string(&mut self, text: &str) -> AppResult<()> {
        SerialLink::send_string(self, text)
    }

    fn is_open(&self) -> bool {
        SerialLink::is_open(self)
    }

    fn close_port(&mut self) {
        SerialLink::close_port(self);
    }
}

impl TokenSource for SerialLink {
    fn has_data(&mut self) -> AppResult<bool> {
        SerialLink::has_data(self)
    }

    fn read_token(&mut self) -> AppResult<Option<String>> {
        SerialLink::read_token(self)
    }

    fn is_open(&self) -> bool {
        SerialLink::is_open(self)
    }

    fn close_port(&mut self) {
        SerialLink::close_port(self);
    }
}
