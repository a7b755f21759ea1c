//! Lighting Dispatcher
//!
//! Periodic sampling loop: every tick it reads the active [`Mode`], resolves
//! the signal source, converts it to a color, applies the brightness scale and
//! writes one frame through the link.
//!
//! # Concurrency
//!
//! - Mode and brightness live behind a lock that is only held while the
//!   frame is computed, never across the blocking write.
//! - The link sits behind an async mutex. A tick that finds it busy (the
//!   previous frame is still being written) is skipped, not queued.
//! - Writes run on Tokio's blocking pool.
//! - Audio and stats values are read from [`SignalCell`] snapshots.
//!
//! # Failure policy
//!
//! A failed tick is counted, logged and published on the error channel; the
//! run loop keeps going. Reacting to repeated failures (stopping, reopening the
//! link) is the owner's call.

use crate::error::{AppResult, LightError};
use crate::hardware::capabilities::FrameWriter;
use crate::mapping::Rgb;
use crate::mode::Mode;
use crate::protocol::{uv_command, FrameFormat};
use crate::signal::{SignalCell, StatsSample};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Default dispatch period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Result of one successful [`LightingDispatcher::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame was written.
    Sent(String),
    /// The previous frame was still in flight; nothing was written.
    Skipped,
}

/// Snapshot of the dispatcher's tick counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickCounters {
    /// Frames written
    pub sent: u64,
    /// Ticks dropped because a frame was in flight
    pub skipped: u64,
    /// Ticks whose write failed
    pub failed: u64,
}

#[derive(Debug, Clone, Copy)]
struct LightingState {
    mode: Mode,
    brightness: f64,
    /// Bumped on every mode change; restarts animations.
    generation: u64,
}

#[derive(Debug, Default)]
struct AnimationClock {
    generation: u64,
    ticks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Signal cells the dispatcher reads from.
#[derive(Debug, Clone)]
pub struct SignalSources {
    /// Latest audio intensity in `[0, 1]`
    pub intensity: SignalCell<f32>,
    /// Latest spectrum color
    pub spectrum: SignalCell<Rgb>,
    /// Latest telemetry sample, if any arrived yet
    pub stats: SignalCell<Option<StatsSample>>,
}

impl Default for SignalSources {
    fn default() -> Self {
        Self {
            intensity: SignalCell::new(0.0),
            spectrum: SignalCell::new(Rgb::BLACK),
            stats: SignalCell::new(None),
        }
    }
}

struct Inner<L> {
    link: Arc<AsyncMutex<L>>,
    state: RwLock<LightingState>,
    clock: Mutex<AnimationClock>,
    sources: SignalSources,
    format: FrameFormat,
    interval: Duration,
    counters: Counters,
    last_error: SignalCell<Option<String>>,
}

/// Drives one lighting link from the selected signal source.
///
/// Cheap to clone; clones share state.
pub struct LightingDispatcher<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for LightingDispatcher<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L> std::fmt::Debug for LightingDispatcher<L>
where
    L: FrameWriter + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightingDispatcher")
            .field("mode", &self.mode())
            .field("brightness", &self.brightness())
            .field("format", &self.inner.format)
            .field("interval", &self.inner.interval)
            .finish()
    }
}

impl<L> LightingDispatcher<L>
where
    L: FrameWriter + 'static,
{
    /// Create a dispatcher that owns `link`. Starts in [`Mode::Off`] at full brightness.
    pub fn new(link: L, sources: SignalSources) -> Self {
        Self::with_settings(link, sources, FrameFormat::default(), DEFAULT_TICK_INTERVAL)
    }

    /// Create a dispatcher with an explicit frame format and tick interval.
    pub fn with_settings(
        link: L,
        sources: SignalSources,
        format: FrameFormat,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                link: Arc::new(AsyncMutex::new(link)),
                state: RwLock::new(LightingState {
                    mode: Mode::Off,
                    brightness: 1.0,
                    generation: 0,
                }),
                clock: Mutex::new(AnimationClock::default()),
                sources,
                format,
                interval,
                counters: Counters::default(),
                last_error: SignalCell::new(None),
            }),
        }
    }

    /// Select the signal source. Takes effect on the next tick.
    pub fn set_mode(&self, mode: Mode) {
        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        state.mode = mode;
        state.generation = state.generation.wrapping_add(1);
        info!(%mode, "Lighting mode changed");
    }

    /// Set the brightness scale, clamped to `[0, 1]`. Takes effect on the next tick.
    pub fn set_brightness(&self, scale: f64) {
        let scale = if scale.is_nan() { 0.0 } else { scale.clamp(0.0, 1.0) };
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .brightness = scale;
        debug!(brightness = scale, "Brightness changed");
    }

    /// The active mode.
    pub fn mode(&self) -> Mode {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner).mode
    }

    /// The brightness scale.
    pub fn brightness(&self) -> f64 {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .brightness
    }

    /// The signal cells this dispatcher reads.
    pub fn sources(&self) -> &SignalSources {
        &self.inner.sources
    }

    /// Tick counters so far.
    pub fn counters(&self) -> TickCounters {
        let c = &self.inner.counters;
        TickCounters {
            sent: c.sent.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Receiver for tick failures. Holds the message of the most recent error,
    /// cleared by the next successful write.
    pub fn errors(&self) -> watch::Receiver<Option<String>> {
        self.inner.last_error.subscribe()
    }

    /// Elapsed animation time for this tick; restarts when the mode generation changes.
    fn advance_clock(&self, generation: u64) -> Duration {
        let mut clock = self.inner.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if clock.generation != generation {
            clock.generation = generation;
            clock.ticks = 0;
        }
        let elapsed = self
            .inner
            .interval
            .saturating_mul(u32::try_from(clock.ticks).unwrap_or(u32::MAX));
        clock.ticks = clock.ticks.saturating_add(1);
        elapsed
    }

    /// Compute the frame for the current mode. Holds the state lock only while copying.
    fn compose_frame(&self) -> String {
        let state = *self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        let sources = &self.inner.sources;

        let color = match state.mode {
            Mode::Off => return self.inner.format.off_frame().to_string(),
            Mode::Static(color) => color,
            Mode::Animation(animation) => animation.color_at(self.advance_clock(state.generation)),
            Mode::Audio(variant) => variant.color(sources.intensity.get(), sources.spectrum.get()),
            Mode::Stats(variant) => match sources.stats.get() {
                Some(sample) => variant.color(&sample),
                None => Rgb::BLACK,
            },
        };

        self.inner.format.encode(color.scaled(state.brightness))
    }

    /// Run one dispatch cycle.
    ///
    /// Returns `Skipped` without writing if the previous frame is still in
    /// flight. Write failures are returned, counted and published; they never
    /// affect later ticks.
    pub async fn tick(&self) -> AppResult<TickOutcome> {
        let Ok(mut guard) = Arc::clone(&self.inner.link).try_lock_owned() else {
            self.inner.counters.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Frame still in flight, skipping tick");
            return Ok(TickOutcome::Skipped);
        };

        let frame = self.compose_frame();
        let written = frame.clone();
        let result = tokio::task::spawn_blocking(move || guard.send_string(&written))
            .await
            .map_err(|e| LightError::Io(std::io::Error::other(e)))
            .and_then(|r| r);

        match result {
            Ok(()) => {
                self.inner.counters.sent.fetch_add(1, Ordering::Relaxed);
                if self.inner.last_error.get().is_some() {
                    self.inner.last_error.set(None);
                }
                trace!(frame = %frame.escape_default(), "Frame dispatched");
                Ok(TickOutcome::Sent(frame))
            }
            Err(e) => {
                self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Lighting tick failed");
                self.inner.last_error.set(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Run `f` against the link with exclusive access, on the blocking pool.
    ///
    /// Waits for any in-flight frame. Use it to reopen or reconfigure the link.
    pub async fn with_link<F, R>(&self, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut L) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut guard = Arc::clone(&self.inner.link).lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut guard))
            .await
            .map_err(|e| LightError::Io(std::io::Error::other(e)))
    }

    /// Switch the auxiliary UV light. Written immediately, after any in-flight frame.
    pub async fn set_uv(&self, on: bool) -> AppResult<()> {
        self.with_link(move |link| link.send_string(uv_command(on)))
            .await
            .and_then(|r| r)?;
        info!(on, "UV light switched");
        Ok(())
    }

    /// Turn everything dark and release the link.
    ///
    /// Sends the off frame and `UV 0`, then closes the port. The link is
    /// closed even if the writes fail; the first write error is returned.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.set_mode(Mode::Off);
        let off = self.inner.format.off_frame();
        let result = self
            .with_link(move |link| {
                let result = link
                    .send_string(off)
                    .and_then(|()| link.send_string(uv_command(false)));
                link.close_port();
                result
            })
            .await
            .and_then(|r| r);
        info!("Lighting dispatcher shut down");
        result
    }

    /// Tick every interval until `stop` flips to `true` or its sender is dropped.
    ///
    /// Each tick runs as its own task so a stalled write makes the following
    /// ticks skip instead of piling up behind it.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.inner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.inner.interval, "Lighting dispatcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        let _ = this.tick().await;
                    });
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        let counters = self.counters();
        info!(
            sent = counters.sent,
            skipped = counters.skipped,
            failed = counters.failed,
            "Lighting dispatcher stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Animation, AnimationKind};
    use crate::hardware::mock::MockLink;
    use crate::mode::{AudioVariant, StatsVariant};
    use tracing_test::traced_test;

    fn dispatcher() -> (LightingDispatcher<MockLink>, MockLink) {
        let link = MockLink::new();
        let probe = link.clone();
        (LightingDispatcher::new(link, SignalSources::default()), probe)
    }

    #[tokio::test]
    async fn test_static_then_off() {
        let (d, link) = dispatcher();
        d.set_mode(Mode::Static(Rgb::new(255, 0, 0)));
        assert_eq!(
            d.tick().await.unwrap(),
            TickOutcome::Sent("255,0,0\n".to_string())
        );
        d.set_mode(Mode::Off);
        d.tick().await.unwrap();
        assert_eq!(link.frames(), vec!["255,0,0\n", "0,0,0\n"]);
    }

    #[tokio::test]
    async fn test_off_ignores_brightness() {
        let (d, link) = dispatcher();
        d.set_brightness(0.3);
        d.tick().await.unwrap();
        assert_eq!(link.frames(), vec!["0,0,0\n"]);
    }

    #[tokio::test]
    async fn test_brightness_scales_channels() {
        let (d, link) = dispatcher();
        d.set_mode(Mode::Static(Rgb::new(200, 100, 50)));
        d.set_brightness(0.5);
        d.tick().await.unwrap();
        d.set_brightness(7.0);
        d.tick().await.unwrap();
        assert_eq!(link.frames(), vec!["100,50,25\n", "200,100,50\n"]);
        assert_eq!(d.brightness(), 1.0);
    }

    #[tokio::test]
    async fn test_tagged_format() {
        let link = MockLink::new();
        let probe = link.clone();
        let d = LightingDispatcher::with_settings(
            link,
            SignalSources::default(),
            FrameFormat::Tagged,
            DEFAULT_TICK_INTERVAL,
        );
        d.set_mode(Mode::Static(Rgb::new(0, 255, 0)));
        d.tick().await.unwrap();
        d.set_mode(Mode::Off);
        d.tick().await.unwrap();
        assert_eq!(probe.frames(), vec!["RGB 0 255 0\n", "RGB 0 0 0\n"]);
    }

    #[tokio::test]
    async fn test_animation_restarts_on_mode_change() {
        let (d, link) = dispatcher();
        let fade = Mode::Animation(
            Animation::new(AnimationKind::HueFade).with_cycle(DEFAULT_TICK_INTERVAL * 3),
        );
        d.set_mode(fade);
        for _ in 0..3 {
            d.tick().await.unwrap();
        }
        d.set_mode(fade);
        d.tick().await.unwrap();
        assert_eq!(
            link.frames(),
            vec!["255,0,0\n", "0,255,0\n", "0,0,255\n", "255,0,0\n"]
        );
    }

    #[tokio::test]
    async fn test_audio_reads_latest_intensity() {
        let (d, link) = dispatcher();
        d.set_mode(Mode::Audio(AudioVariant::Level { hue: 240.0 }));
        d.sources().intensity.set(1.0);
        d.tick().await.unwrap();
        d.sources().intensity.set(0.0);
        d.tick().await.unwrap();
        assert_eq!(link.frames(), vec!["0,0,255\n", "0,0,0\n"]);
    }

    #[tokio::test]
    async fn test_stats_without_sample_is_dark() {
        let (d, link) = dispatcher();
        d.set_mode(Mode::Stats(StatsVariant::Heat));
        d.tick().await.unwrap();
        d.sources().stats.set(Some(StatsSample::new(0.0, 0.0, 100.0)));
        d.tick().await.unwrap();
        assert_eq!(link.frames(), vec!["0,0,0\n", "0,255,0\n"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_future_ticks() {
        let (d, link) = dispatcher();
        let errors = d.errors();
        d.set_mode(Mode::Static(Rgb::new(1, 2, 3)));

        link.set_fail_writes(true);
        assert!(matches!(d.tick().await, Err(LightError::WriteFailed(_))));
        assert!(errors.borrow().is_some());

        link.set_fail_writes(false);
        assert!(d.tick().await.is_ok());
        assert!(errors.borrow().is_none());
        assert_eq!(d.counters(), TickCounters { sent: 1, skipped: 0, failed: 1 });
    }

    #[tokio::test]
    #[traced_test]
    async fn test_tick_failure_is_logged() {
        let (d, link) = dispatcher();
        link.set_fail_writes(true);
        assert!(d.tick().await.is_err());
        assert!(logs_contain("Lighting tick failed"));
    }

    #[tokio::test]
    async fn test_closed_link_reports_not_open() {
        let d = LightingDispatcher::new(MockLink::closed(), SignalSources::default());
        assert!(matches!(d.tick().await, Err(LightError::NotOpen)));
    }

    #[tokio::test]
    async fn test_in_flight_frame_skips_next_tick() {
        let (d, link) = dispatcher();
        link.set_write_delay(Duration::from_millis(200));
        d.set_mode(Mode::Static(Rgb::new(9, 9, 9)));

        let slow = d.clone();
        let first = tokio::spawn(async move { slow.tick().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = d.tick().await.unwrap();

        assert_eq!(second, TickOutcome::Skipped);
        assert!(matches!(first.await.unwrap(), Ok(TickOutcome::Sent(_))));
        assert_eq!(link.frames().len(), 1);
        assert_eq!(d.counters().skipped, 1);
    }

    #[tokio::test]
    async fn test_uv_and_shutdown() {
        let (d, link) = dispatcher();
        d.set_mode(Mode::Static(Rgb::new(255, 255, 255)));
        d.set_uv(true).await.unwrap();
        d.shutdown().await.unwrap();
        assert_eq!(link.frames(), vec!["UV 1\n", "0,0,0\n", "UV 0\n"]);
        assert!(!link.is_open());
        assert_eq!(d.mode(), Mode::Off);
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let link = MockLink::new();
        let probe = link.clone();
        let d = LightingDispatcher::with_settings(
            link,
            SignalSources::default(),
            FrameFormat::Csv,
            Duration::from_millis(5),
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let runner = d.clone();
        let handle = tokio::spawn(async move { runner.run(stop_rx).await });

        tokio::time::sleep(Duration::from_millis(60)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!probe.frames().is_empty());
        assert!(probe.frames().iter().all(|f| f == "0,0,0\n"));
    }
}
