//! Link Capabilities
//!
//! Small traits describing what the dispatcher and the read loop need from a
//! serial connection. [`SerialLink`](crate::hardware::SerialLink) implements both;
//! [`MockLink`](crate::hardware::mock::MockLink) implements both for tests.
//!
//! # Design
//!
//! Each capability trait:
//! - Is synchronous (serial I/O is blocking; async callers go through `spawn_blocking`)
//! - Is `Send`, so a link can move onto the thread that owns it
//! - Uses [`AppResult`] for errors
//! - Takes `&mut self`: a link has exactly one owner at a time

use crate::error::AppResult;

/// Capability: Line Output
///
/// Devices that accept framed text commands.
///
/// # Contract
/// - `send_string` writes every byte of `text` or fails
/// - Fails with `NotOpen` while the link is closed
/// - Fails with `WriteFailed` on a hardware error; the link stays open
pub trait FrameWriter: Send {
    /// Write the full byte sequence of `text`.
    fn send_string(&mut self, text: &str) -> AppResult<()>;

    /// Whether a handle is currently held.
    fn is_open(&self) -> bool;

    /// Release the handle. Idempotent.
    fn close_port(&mut self);
}

/// Capability: Token Input
///
/// Devices that deliver newline-separated tokens (read mode).
///
/// # Contract
/// - `has_data` never blocks and never consumes input
/// - `read_token` returns `Ok(None)` when no complete line arrived within the
///   link's read timeout; partial input is kept for the next call
/// - Both fail with `NotOpen` once the link is closed
pub trait TokenSource: Send {
    /// Non-blocking check for at least one pending byte.
    fn has_data(&mut self) -> AppResult<bool>;

    /// Read one newline-terminated token, without the terminator.
    fn read_token(&mut self) -> AppResult<Option<String>>;

    /// Whether a handle is currently held.
    fn is_open(&self) -> bool;

    /// Release the handle. Idempotent.
    fn close_port(&mut self);
}
