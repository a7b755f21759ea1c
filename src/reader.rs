//! Signal Reader
//!
//! Background read loop for read mode. The reader owns its own link on a
//! dedicated OS thread, polls it for inbound tokens, decodes them into
//! [`GamepadEvent`]s and hands each one to a sink.
//!
//! The loop checks its stop flag on every iteration and sleeps for a bounded
//! interval whenever nothing is pending, so [`SignalReader::stop`] is observed
//! within one poll interval plus the link's read timeout.
//!
//! # Example
//!
//! ```
//! use caselights::hardware::mock::MockLink;
//! use caselights::reader::{ReaderEvent, SignalReader};
//! use std::sync::mpsc;
//! use std::time::Duration;
//!
//! let link = MockLink::new();
//! link.push_tokens(["B0:1"]);
//! link.close_when_drained();
//!
//! let (tx, rx) = mpsc::channel();
//! let reader = SignalReader::spawn(link, Duration::from_millis(5), move |event| {
//!     let _ = tx.send(event);
//! })
//! .unwrap();
//! reader.join();
//! assert_eq!(rx.iter().count(), 2);
//! ```

use crate::error::{AppResult, LightError};
use crate::hardware::capabilities::TokenSource;
use crate::protocol::GamepadEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default sleep between polls when no data is pending.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Why the read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// [`SignalReader::stop`] was called.
    Stopped,
    /// The link was closed underneath the loop.
    Closed,
    /// A read failed; treated as a disconnect.
    ReadFailed(String),
}

/// Everything the sink receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// One decoded input event.
    Gamepad(GamepadEvent),
    /// The loop has ended. Always the last event delivered.
    Disconnected(ExitReason),
}

/// Handle to a running read loop.
#[derive(Debug)]
pub struct SignalReader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<ExitReason>>,
}

impl SignalReader {
    /// Start the read loop on its own thread.
    ///
    /// The link moves into the thread and is closed when the loop exits.
    pub fn spawn<L, F>(link: L, poll_interval: Duration, sink: F) -> AppResult<Self>
    where
        L: TokenSource + 'static,
        F: FnMut(ReaderEvent) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("caselights-reader".to_string())
            .spawn(move || read_loop(link, &flag, poll_interval, sink))?;

        info!(poll_interval = ?poll_interval, "Signal reader started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the loop to stop. Returns immediately.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for the loop to exit and return why it did.
    pub fn join(mut self) -> ExitReason {
        self.wait()
    }

    fn wait(&mut self) -> ExitReason {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| ExitReason::ReadFailed("reader thread panicked".to_string())),
            None => ExitReason::Stopped,
        }
    }
}

impl Drop for SignalReader {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            self.wait();
        }
    }
}

fn read_loop<L, F>(mut link: L, stop: &AtomicBool, poll_interval: Duration, mut sink: F) -> ExitReason
where
    L: TokenSource,
    F: FnMut(ReaderEvent),
{
    let reason = loop {
        if stop.load(Ordering::SeqCst) {
            break ExitReason::Stopped;
        }
        if !link.is_open() {
            break ExitReason::Closed;
        }

        match link.has_data() {
            Ok(true) => {}
            Ok(false) => {
                std::thread::sleep(poll_interval);
                continue;
            }
            Err(e) => break exit_for(&e),
        }

        match link.read_token() {
            Ok(Some(token)) => match GamepadEvent::decode(&token) {
                Some(event) => {
                    trace!(?event, "Gamepad event");
                    sink(ReaderEvent::Gamepad(event));
                }
                None => debug!(token = %token.escape_default(), "Discarding unrecognised token"),
            },
            Ok(None) => {}
            Err(e) => break exit_for(&e),
        }
    };

    link.close_port();
    match &reason {
        ExitReason::ReadFailed(message) => warn!(error = %message, "Signal reader disconnected"),
        other => info!(reason = ?other, "Signal reader stopped"),
    }
    sink(ReaderEvent::Disconnected(reason.clone()));
    reason
}

fn exit_for(error: &LightError) -> ExitReason {
    match error {
        LightError::NotOpen => ExitReason::Closed,
        other => ExitReason::ReadFailed(other.to_string()),
    }
}
