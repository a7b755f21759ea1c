//! Shared signal cells and the stats probe boundary.
//!
//! The audio and stats contexts publish their latest value into a
//! [`SignalCell`]; the dispatcher's timer reads it once per tick. A cell is a
//! `tokio::sync::watch` channel underneath, so every read is a whole snapshot
//! and a reader can never observe a half-written value.
//!
//! Telemetry itself (GPU load, VRAM, display state) is produced outside the
//! crate. [`StatsProbe`] is the seam; [`CommandProbe`] is a ready-made probe
//! that runs an external command and parses the first number it prints.

use crate::error::{AppResult, LightError};
use crate::mapping::map;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// =============================================================================
// SignalCell<T>
// =============================================================================

/// Latest-value cell with atomic snapshot reads.
///
/// Clones share the same value. Writes replace the value wholesale.
#[derive(Debug)]
pub struct SignalCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: Arc<watch::Sender<T>>,
}

impl<T> Clone for SignalCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> SignalCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish a new value, replacing the previous one.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Receiver that is notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T> Default for SignalCell<T>
where
    T: Clone + Send + Sync + Default + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

// =============================================================================
// Stats samples
// =============================================================================

/// One telemetry reading together with the domain it was measured in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSample {
    /// Raw value (percent, bytes, display count...)
    pub value: f64,
    /// Lower bound of the source domain
    pub domain_min: f64,
    /// Upper bound of the source domain
    pub domain_max: f64,
}

impl StatsSample {
    /// Create a sample.
    pub fn new(value: f64, domain_min: f64, domain_max: f64) -> Self {
        Self {
            value,
            domain_min,
            domain_max,
        }
    }

    /// Position of `value` inside its domain, clamped to `[0, 1]`.
    ///
    /// A degenerate domain yields 0.
    pub fn normalized(&self) -> f64 {
        let unit = map(self.value, self.domain_min, self.domain_max, 0.0, 1.0);
        if unit.is_nan() {
            0.0
        } else {
            unit.clamp(0.0, 1.0)
        }
    }
}

/// Source of telemetry samples.
#[async_trait]
pub trait StatsProbe: Send + Sync {
    /// Query the current value.
    async fn latest_sample(&self) -> AppResult<StatsSample>;
}

/// Probe that runs a shell command and parses the first number on stdout.
///
/// # Example
///
/// ```no_run
/// use caselights::signal::{CommandProbe, StatsProbe};
///
/// # async fn example() -> caselights::error::AppResult<()> {
/// let probe = CommandProbe::new(
///     "nvidia-smi --query-gpu=utilization.gpu --format=csv,noheader,nounits",
///     0.0,
///     100.0,
/// );
/// let sample = probe.latest_sample().await?;
/// println!("GPU load: {}%", sample.value);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: String,
    domain_min: f64,
    domain_max: f64,
}

impl CommandProbe {
    /// Create a probe for `command` whose output lies in `[domain_min, domain_max]`.
    pub fn new(command: impl Into<String>, domain_min: f64, domain_max: f64) -> Self {
        Self {
            command: command.into(),
            domain_min,
            domain_max,
        }
    }

    fn shell(&self) -> tokio::process::Command {
        #[cfg(windows)]
        {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        }
    }
}

#[async_trait]
impl StatsProbe for CommandProbe {
    async fn latest_sample(&self) -> AppResult<StatsSample> {
        let output = self.shell().kill_on_drop(true).output().await?;
        if !output.status.success() {
            return Err(LightError::Probe(format!(
                "'{}' exited with {}",
                self.command, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = parse_first_number(&stdout).ok_or_else(|| {
            LightError::Probe(format!("no number in output of '{}'", self.command))
        })?;

        Ok(StatsSample::new(value, self.domain_min, self.domain_max))
    }
}

/// First whitespace/comma separated token that parses as a float.
fn parse_first_number(text: &str) -> Option<f64> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == '%')
        .filter(|token| !token.is_empty())
        .find_map(|token| token.parse::<f64>().ok().filter(|value| value.is_finite()))
}

/// Poll `probe` every `interval` and publish each sample into `cell`.
///
/// Probe failures are logged and the previous sample is kept. Abort the
/// returned handle to stop polling.
pub fn spawn_stats_poller(
    probe: Arc<dyn StatsProbe>,
    cell: SignalCell<Option<StatsSample>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match probe.latest_sample().await {
                Ok(sample) => {
                    debug!(value = sample.value, "Stats sample");
                    cell.set(Some(sample));
                }
                Err(e) => warn!(error = %e, "Stats probe failed"),
            }
        }
    })
}
