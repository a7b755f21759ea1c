//! Value mapping and color-space conversion.
//!
//! Pure numeric helpers that turn a raw signal into an RGB triple:
//!
//! - [`map`] / [`try_map`]: affine remap from one range to another
//! - [`hsv_to_rgb`]: hue-sector HSV to 8-bit RGB conversion
//!
//! `map` deliberately extrapolates: a value outside `[from_min, from_max]` lands
//! outside `[to_min, to_max]`. Callers that need bounded output clamp explicitly.

use crate::error::{AppResult, LightError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One color frame worth of channel values.
///
/// Components are always valid 8-bit values; every constructor that starts from
/// floating point input clamps before converting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl Rgb {
    /// All channels zero.
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    /// Build a color from raw channel values.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from unit-range floats, rounding and clamping each channel.
    pub fn from_unit(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: unit_to_channel(r),
            g: unit_to_channel(g),
            b: unit_to_channel(b),
        }
    }

    /// Multiply every channel by `factor` (clamped to `[0, 1]`), rounding to nearest.
    pub fn scaled(self, factor: f64) -> Self {
        let factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
        let scale = |c: u8| to_channel(f64::from(c) * factor);
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }

    /// True when every channel is zero.
    pub fn is_black(self) -> bool {
        self == Rgb::BLACK
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Round a `0..=255` float to the nearest channel value, clamping out-of-range input.
fn to_channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    // Clamped to [0, 255] first, so the cast is lossless.
    value.round().clamp(0.0, 255.0) as u8
}

fn unit_to_channel(value: f64) -> u8 {
    to_channel(value * 255.0)
}

/// Affine remap of `value` from `[from_min, from_max]` onto `[to_min, to_max]`.
///
/// A degenerate source domain (`from_min == from_max`) is treated as a no-op and
/// returns `to_min`. Use [`try_map`] to have it reported instead.
///
/// The result is not clamped.
pub fn map(value: f64, from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> f64 {
    try_map(value, from_min, from_max, to_min, to_max).unwrap_or(to_min)
}

/// Like [`map`], but rejects a degenerate source domain with
/// [`LightError::DegenerateRange`].
pub fn try_map(
    value: f64,
    from_min: f64,
    from_max: f64,
    to_min: f64,
    to_max: f64,
) -> AppResult<f64> {
    let span = from_max - from_min;
    if span == 0.0 || !span.is_finite() {
        return Err(LightError::DegenerateRange {
            min: from_min,
            max: from_max,
        });
    }
    Ok(to_min + (value - from_min) * (to_max - to_min) / span)
}

/// Convert HSV to 8-bit RGB.
///
/// * `h` - hue in degrees; normalised modulo 360 so any finite value is accepted
/// * `s` - saturation, clamped to `[0, 1]`
/// * `v` - value, clamped to `[0, 1]`
///
/// Channels are rounded to the nearest integer, never truncated.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let s = if s.is_nan() { 0.0 } else { s.clamp(0.0, 1.0) };
    let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };

    if s == 0.0 {
        let c = unit_to_channel(v);
        return Rgb::new(c, c, c);
    }

    let h = if h.is_finite() { h.rem_euclid(360.0) } else { 0.0 };
    let sector = h / 60.0;
    let i = sector.floor();
    let f = sector - i;

    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    // rem_euclid can return exactly 360.0 for tiny negative inputs
    let (r, g, b) = match (i as u32) % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    Rgb::from_unit(r, g, b)
}
