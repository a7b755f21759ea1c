//! Audio signal reduction.
//!
//! Turns a delivered buffer of float samples into values the dispatcher can
//! display:
//!
//! - [`reduce`]: RMS loudness times sensitivity, clamped to `[0, 1]`. Pure;
//!   no history is kept between calls.
//! - [`Smoother`]: optional exponential moving average applied after `reduce`.
//! - [`SpectrumAnalyzer`]: Hann-windowed FFT split into bass / mid / treble
//!   bands that drive red / green / blue directly.
//! - [`AudioFeed`]: the delivery-side entry point. Runs all of the above in the
//!   audio callback's context and publishes into [`SignalCell`]s. Nothing is
//!   queued; a newer buffer simply overwrites the previous result.

use crate::mapping::Rgb;
use crate::signal::SignalCell;
use byteorder::{LittleEndian, ReadBytesExt};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use tracing::trace;

/// Root-mean-square magnitude of `buffer`. Empty buffers yield 0.
pub fn rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum: f64 = buffer.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / buffer.len() as f64).sqrt() as f32
}

/// Reduce a sample buffer to an intensity in `[0, 1]`.
///
/// `intensity = clamp(rms(buffer) * sensitivity, 0, 1)`. Silence and empty
/// buffers give 0 for any sensitivity; a NaN result is reported as 0.
pub fn reduce(buffer: &[f32], sensitivity: f32) -> f32 {
    let intensity = rms(buffer) * sensitivity;
    if intensity.is_nan() {
        0.0
    } else {
        intensity.clamp(0.0, 1.0)
    }
}

// =============================================================================
// Smoother
// =============================================================================

/// Exponential moving average: `y = decay * y_prev + (1 - decay) * x`.
///
/// `decay` is clamped to `[0, 1)`; 0 passes input straight through.
#[derive(Debug, Clone, Copy)]
pub struct Smoother {
    decay: f32,
    value: f32,
}

impl Smoother {
    /// Create a smoother starting at 0.
    pub fn new(decay: f32) -> Self {
        let decay = if decay.is_nan() { 0.0 } else { decay.clamp(0.0, 0.999) };
        Self { decay, value: 0.0 }
    }

    /// Feed one value and return the smoothed output.
    pub fn update(&mut self, input: f32) -> f32 {
        self.value = self.decay * self.value + (1.0 - self.decay) * input;
        self.value
    }
}

// =============================================================================
// SpectrumAnalyzer
// =============================================================================

/// Upper edge of the bass band in Hz.
pub const BASS_MAX_HZ: f32 = 400.0;
/// Upper edge of the mid band in Hz.
pub const MID_MAX_HZ: f32 = 4000.0;

/// Per-call decay of the running band maximum.
const MAX_COOLDOWN: f32 = 0.995;
/// Floor for the running maximum so silence does not divide by zero.
const MIN_MAX_ENERGY: f32 = 1e-4;

/// FFT band splitter producing an RGB color from one audio block.
#[derive(Clone)]
pub struct SpectrumAnalyzer {
    block_len: usize,
    sample_rate: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    max_energy: f32,
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("block_len", &self.block_len)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl SpectrumAnalyzer {
    /// Create an analyzer for blocks of `block_len` samples at `sample_rate` Hz.
    ///
    /// `block_len` is raised to at least 2.
    pub fn new(block_len: usize, sample_rate: f32) -> Self {
        let block_len = block_len.max(2);
        let fft = FftPlanner::new().plan_fft_forward(block_len);

        let window = (0..block_len)
            .map(|i| (PI * i as f32 / block_len as f32).sin().powi(2))
            .collect();

        Self {
            block_len,
            sample_rate,
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); block_len],
            max_energy: MIN_MAX_ENERGY,
        }
    }

    fn freq_to_bin(&self, freq: f32) -> usize {
        let bin = (freq * self.block_len as f32 / self.sample_rate) as usize;
        bin.min(self.block_len / 2)
    }

    fn band_energy(&self, start_hz: f32, end_hz: f32) -> f32 {
        let start = self.freq_to_bin(start_hz);
        let end = self.freq_to_bin(end_hz).max(start);
        let bins = &self.scratch[start..=end];
        bins.iter().map(|c| c.norm()).sum::<f32>() / bins.len() as f32
    }

    /// Raw (un-normalised) bass, mid and treble energies of `buffer`.
    ///
    /// Shorter buffers are zero padded; longer ones use their last block.
    pub fn band_energies(&mut self, buffer: &[f32]) -> [f32; 3] {
        let tail = &buffer[buffer.len().saturating_sub(self.block_len)..];
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = tail.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let nyquist = self.sample_rate / 2.0;
        [
            self.band_energy(0.0, BASS_MAX_HZ),
            self.band_energy(BASS_MAX_HZ, MID_MAX_HZ),
            self.band_energy(MID_MAX_HZ, nyquist),
        ]
    }

    /// Analyse one block and return its color.
    ///
    /// Bands are normalised against one decaying maximum shared by all three,
    /// so their relative loudness survives.
    pub fn analyze(&mut self, buffer: &[f32]) -> Rgb {
        let energies = self
            .band_energies(buffer)
            .map(|e| if e.is_finite() { e } else { 0.0 });
        let loudest = energies.iter().copied().fold(0.0_f32, f32::max);
        self.max_energy = (self.max_energy * MAX_COOLDOWN)
            .max(loudest)
            .max(MIN_MAX_ENERGY);

        let unit = energies.map(|e| f64::from(e / self.max_energy));
        Rgb::from_unit(unit[0], unit[1], unit[2])
    }
}

// =============================================================================
// AudioFeed
// =============================================================================

/// Receives the raw RMS magnitude of every delivered buffer.
pub type MagnitudeSink = Box<dyn FnMut(f32) + Send>;

/// Delivery-side audio pipeline.
///
/// Call [`deliver`](AudioFeed::deliver) from the audio capture callback.
pub struct AudioFeed {
    sensitivity: f32,
    smoother: Option<Smoother>,
    spectrum: Option<SpectrumAnalyzer>,
    intensity_cell: SignalCell<f32>,
    spectrum_cell: SignalCell<Rgb>,
    magnitude_sink: Option<MagnitudeSink>,
}

impl fmt::Debug for AudioFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFeed")
            .field("sensitivity", &self.sensitivity)
            .field("smoother", &self.smoother)
            .field("spectrum", &self.spectrum)
            .field("has_magnitude_sink", &self.magnitude_sink.is_some())
            .finish()
    }
}

impl AudioFeed {
    /// Create a feed publishing into the given cells.
    pub fn new(intensity_cell: SignalCell<f32>, spectrum_cell: SignalCell<Rgb>) -> Self {
        Self {
            sensitivity: 1.0,
            smoother: None,
            spectrum: None,
            intensity_cell,
            spectrum_cell,
            magnitude_sink: None,
        }
    }

    /// Set the loudness sensitivity factor.
    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Smooth the published intensity with an EMA of the given decay.
    pub fn with_smoothing(mut self, decay: f32) -> Self {
        self.smoother = Some(Smoother::new(decay));
        self
    }

    /// Also publish a spectrum color for every buffer.
    pub fn with_spectrum(mut self, analyzer: SpectrumAnalyzer) -> Self {
        self.spectrum = Some(analyzer);
        self
    }

    /// Forward the raw RMS magnitude of every buffer to `sink`.
    pub fn with_magnitude_sink(mut self, sink: impl FnMut(f32) + Send + 'static) -> Self {
        self.magnitude_sink = Some(Box::new(sink));
        self
    }

    /// Process one delivered buffer and publish its results. Returns the intensity.
    pub fn deliver(&mut self, buffer: &[f32]) -> f32 {
        let mut intensity = reduce(buffer, self.sensitivity);
        if let Some(smoother) = self.smoother.as_mut() {
            intensity = smoother.update(intensity);
        }
        self.intensity_cell.set(intensity);

        if let Some(analyzer) = self.spectrum.as_mut() {
            self.spectrum_cell.set(analyzer.analyze(buffer));
        }

        if let Some(sink) = self.magnitude_sink.as_mut() {
            sink(rms(buffer));
        }

        trace!(samples = buffer.len(), intensity, "Audio buffer delivered");
        intensity
    }
}

/// Read one block of little-endian `i16` mono PCM and scale it to `[-1, 1)`.
///
/// Returns `Ok(None)` on a clean end of stream; a trailing partial block is
/// returned as-is.
pub fn read_pcm_block<R: Read>(reader: &mut R, block_len: usize) -> std::io::Result<Option<Vec<f32>>> {
    let mut block = Vec::with_capacity(block_len);
    while block.len() < block_len {
        match reader.read_i16::<LittleEndian>() {
            Ok(sample) => block.push(f32::from(sample) / 32768.0),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    if block.is_empty() {
        Ok(None)
    } else {
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_reduce_silence_is_zero() {
        let silence = vec![0.0_f32; 512];
        for sensitivity in [0.0, 0.5, 1.0, 10.0, 1e6] {
            assert_eq!(reduce(&silence, sensitivity), 0.0);
        }
    }

    #[test]
    fn test_reduce_empty_buffer() {
        assert_eq!(reduce(&[], 5.0), 0.0);
    }

    #[test]
    fn test_reduce_rms_times_sensitivity() {
        let buffer = [0.5, -0.5, 0.5, -0.5];
        assert!((reduce(&buffer, 1.0) - 0.5).abs() < 1e-6);
        assert!((reduce(&buffer, 2.0) - 1.0).abs() < 1e-6);
        assert_eq!(reduce(&buffer, 4.0), 1.0);
    }

    #[test]
    fn test_reduce_monotonic_in_sensitivity() {
        let buffer: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.1).sin() * 0.3).collect();
        let mut previous = 0.0;
        for step in 0..100 {
            let value = reduce(&buffer, step as f32 * 0.1);
            assert!(value >= previous);
            assert!((0.0..=1.0).contains(&value));
            previous = value;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn test_reduce_negative_or_nan_sensitivity() {
        let buffer = [0.5, -0.5];
        assert_eq!(reduce(&buffer, -1.0), 0.0);
        assert_eq!(reduce(&buffer, f32::NAN), 0.0);
    }

    #[test]
    fn test_smoother() {
        let mut s = Smoother::new(0.5);
        assert_eq!(s.update(1.0), 0.5);
        assert_eq!(s.update(1.0), 0.75);
        assert_eq!(Smoother::new(0.0).update(0.3), 0.3);
    }

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_spectrum_bass_tone_is_red() {
        let mut analyzer = SpectrumAnalyzer::new(1024, 48_000.0);
        let color = analyzer.analyze(&sine(100.0, 48_000.0, 1024));
        assert_eq!(color.r, 255);
        assert!(color.g < 128);
        assert!(color.b < 128);
    }

    #[test]
    fn test_spectrum_treble_tone_is_blue() {
        let mut analyzer = SpectrumAnalyzer::new(1024, 48_000.0);
        let energies = analyzer.band_energies(&sine(10_000.0, 48_000.0, 1024));
        assert!(energies[2] > energies[0]);
        assert!(energies[2] > energies[1]);
    }

    #[test]
    fn test_spectrum_silence_is_black() {
        let mut analyzer = SpectrumAnalyzer::new(256, 48_000.0);
        assert_eq!(analyzer.analyze(&[0.0; 256]), Rgb::BLACK);
        assert_eq!(analyzer.analyze(&[]), Rgb::BLACK);
    }

    #[test]
    fn test_feed_publishes_and_forwards_magnitude() {
        let intensity = SignalCell::new(0.0);
        let spectrum = SignalCell::new(Rgb::BLACK);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);

        let mut feed = AudioFeed::new(intensity.clone(), spectrum.clone())
            .with_sensitivity(2.0)
            .with_spectrum(SpectrumAnalyzer::new(64, 8000.0))
            .with_magnitude_sink(move |m| sink_seen.lock().unwrap().push(m));

        let out = feed.deliver(&[0.25, -0.25, 0.25, -0.25]);
        assert!((out - 0.5).abs() < 1e-6);
        assert!((intensity.get() - 0.5).abs() < 1e-6);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!((seen.lock().unwrap()[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_feed_smoothing() {
        let intensity = SignalCell::new(0.0);
        let mut feed = AudioFeed::new(intensity.clone(), SignalCell::new(Rgb::BLACK))
            .with_smoothing(0.5);
        feed.deliver(&[1.0, -1.0]);
        assert_eq!(intensity.get(), 0.5);
    }

    #[test]
    fn test_read_pcm_block() {
        let bytes: Vec<u8> = [0_i16, 16384, -32768]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mut cursor = std::io::Cursor::new(bytes);
        let block = read_pcm_block(&mut cursor, 2).unwrap().unwrap();
        assert_eq!(block, vec![0.0, 0.5]);
        let rest = read_pcm_block(&mut cursor, 2).unwrap().unwrap();
        assert_eq!(rest, vec![-1.0]);
        assert!(read_pcm_block(&mut cursor, 2).unwrap().is_none());
    }
}
