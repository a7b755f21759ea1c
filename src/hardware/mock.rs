//! Mock Link Implementation
//!
//! Provides a simulated serial link for testing without physical hardware.
//! A `MockLink` records every frame written to it and replays a scripted
//! sequence of inbound tokens for the read loop.
//!
//! Clones share the same state, so a test can hand one clone to the
//! dispatcher or reader and inspect the other.
//!
//! # Example
//!
//! ```
//! use caselights::hardware::mock::MockLink;
//! use caselights::hardware::capabilities::FrameWriter;
//!
//! let mut link = MockLink::new();
//! let probe = link.clone();
//! link.send_string("255,0,0\n").unwrap();
//! assert_eq!(probe.frames(), vec!["255,0,0\n".to_string()]);
//! ```

use crate::error::{AppResult, LightError};
use crate::hardware::capabilities::{FrameWriter, TokenSource};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    frames: Vec<String>,
    inbound: VecDeque<String>,
    write_delay: Duration,
    fail_writes: bool,
    fail_reads: bool,
    close_when_drained: bool,
    reads: usize,
}

/// In-memory stand-in for a [`SerialLink`](crate::hardware::SerialLink).
#[derive(Debug, Clone)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// A mock link that starts open.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                open: true,
                ..Default::default()
            })),
        }
    }

    /// A mock link that starts closed.
    pub fn closed() -> Self {
        let link = Self::new();
        link.lock().open = false;
        link
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every frame written so far, in order.
    pub fn frames(&self) -> Vec<String> {
        self.lock().frames.clone()
    }

    /// Make every write sleep for `delay` before completing.
    pub fn set_write_delay(&self, delay: Duration) {
        self.lock().write_delay = delay;
    }

    /// Make writes fail with `WriteFailed` while `fail` is set.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make reads fail with `ReadFailed` while `fail` is set.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Queue inbound tokens for `read_token`.
    pub fn push_tokens<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().inbound.extend(tokens.into_iter().map(Into::into));
    }

    /// Close the link automatically once all queued tokens have been read.
    pub fn close_when_drained(&self) {
        self.lock().close_when_drained = true;
    }

    /// Number of `read_token` calls that reached the mock.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Whether the shared state is open.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Close the shared state. Idempotent.
    pub fn close_port(&self) {
        self.lock().open = false;
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameWriter for MockLink {
    fn send_string(&mut self, text: &str) -> AppResult<()> {
        let delay = {
            let state = self.lock();
            if !state.open {
                return Err(LightError::NotOpen);
            }
            if state.fail_writes {
                return Err(LightError::WriteFailed(ErrorKind::BrokenPipe.into()));
            }
            state.write_delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.lock().frames.push(text.to_string());
        Ok(())
    }

    fn is_open(&self) -> bool {
        MockLink::is_open(self)
    }

    fn close_port(&mut self) {
        MockLink::close_port(self);
    }
}

impl TokenSource for MockLink {
    fn has_data(&mut self) -> AppResult<bool> {
        let state = self.lock();
        if !state.open {
            return Err(LightError::NotOpen);
        }
        Ok(!state.inbound.is_empty() || state.fail_reads)
    }

    fn read_token(&mut self) -> AppResult<Option<String>> {
        let mut state = self.lock();
        if !state.open {
            return Err(LightError::NotOpen);
        }
        state.reads += 1;
        if state.fail_reads {
            return Err(LightError::ReadFailed(ErrorKind::BrokenPipe.into()));
        }
        let token = state.inbound.pop_front();
        if state.inbound.is_empty() && state.close_when_drained {
            state.open = false;
        }
        Ok(token)
    }

    fn is_open(&self) -> bool {
        MockLink::is_open(self)
    }

    fn close_port(&mut self) {
        MockLink::close_port(self);
    }
}
