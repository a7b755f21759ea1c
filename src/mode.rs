//! Lighting mode selection.
//!
//! One enum case per signal source, each carrying only what it needs. Audio
//! and stats variants carry no data of their own: they read the shared
//! signal cells at dispatch time.
//!
//! Modes parse from compact strings used by the CLI and the config file:
//!
//! | String | Mode |
//! |---|---|
//! | `off` | [`Mode::Off`] |
//! | `static:red`, `static:#ff8000`, `static:255,128,0` | [`Mode::Static`] |
//! | `anim:fade`, `anim:sparkle`, `anim:breathe:<color>`, `anim:blink:<color>` | [`Mode::Animation`] |
//! | `audio:level[:<hue>]`, `audio:hue`, `audio:spectrum` | [`Mode::Audio`] |
//! | `stats:heat`, `stats:level[:<hue>]` | [`Mode::Stats`] |

use crate::animation::{Animation, AnimationKind};
use crate::mapping::{hsv_to_rgb, map, Rgb};
use crate::signal::StatsSample;
use std::fmt;
use std::str::FromStr;

/// Named colors available as static modes.
pub const STATIC_COLORS: &[(&str, Rgb)] = &[
    ("off", Rgb::new(0, 0, 0)),
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("white", Rgb::new(255, 255, 255)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("yellow", Rgb::new(255, 255, 0)),
];

/// Look up a named static color, case-insensitively.
pub fn static_color(name: &str) -> Option<Rgb> {
    STATIC_COLORS
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, color)| *color)
}

/// Parse a color name, `#rrggbb`, or `r,g,b`.
pub fn parse_color(text: &str) -> Result<Rgb, String> {
    let text = text.trim();
    if let Some(color) = static_color(text) {
        return Ok(color);
    }

    if let Some(hex) = text.strip_prefix('#') {
        if hex.len() == 6 {
            if let Ok(value) = u32::from_str_radix(hex, 16) {
                let [_, r, g, b] = value.to_be_bytes();
                return Ok(Rgb::new(r, g, b));
            }
        }
        return Err(format!("Invalid hex color '{}'", text));
    }

    let channels: Vec<&str> = text.split(',').map(str::trim).collect();
    if let [r, g, b] = channels.as_slice() {
        if let (Ok(r), Ok(g), Ok(b)) = (r.parse(), g.parse(), b.parse()) {
            return Ok(Rgb::new(r, g, b));
        }
    }

    Err(format!(
        "Unknown color '{}'. Use a name, #rrggbb or r,g,b",
        text
    ))
}

/// How loudness is turned into a color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioVariant {
    /// Fixed hue, brightness follows intensity.
    Level {
        /// Hue in degrees
        hue: f64,
    },
    /// Hue moves from blue (quiet) to red (loud) at full brightness.
    HueShift,
    /// Bass, mid and treble drive red, green and blue.
    Spectrum,
}

impl AudioVariant {
    /// Color for the latest intensity and spectrum snapshot.
    pub fn color(self, intensity: f32, spectrum: Rgb) -> Rgb {
        let intensity = f64::from(intensity).clamp(0.0, 1.0);
        match self {
            AudioVariant::Level { hue } => hsv_to_rgb(hue, 1.0, intensity),
            AudioVariant::HueShift => hsv_to_rgb(map(intensity, 0.0, 1.0, 240.0, 0.0), 1.0, 1.0),
            AudioVariant::Spectrum => spectrum,
        }
    }
}

/// How a telemetry sample is turned into a color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatsVariant {
    /// Green when idle, through yellow, to red at the top of the domain.
    Heat,
    /// Fixed hue, brightness follows the sample.
    Level {
        /// Hue in degrees
        hue: f64,
    },
}

impl StatsVariant {
    /// Color for one sample.
    pub fn color(self, sample: &StatsSample) -> Rgb {
        let unit = sample.normalized();
        match self {
            StatsVariant::Heat => hsv_to_rgb(map(unit, 0.0, 1.0, 120.0, 0.0), 1.0, 1.0),
            StatsVariant::Level { hue } => hsv_to_rgb(hue, 1.0, unit),
        }
    }
}

/// The active signal source.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Mode {
    /// Every channel zero.
    #[default]
    Off,
    /// One fixed color.
    Static(Rgb),
    /// A procedural animation.
    Animation(Animation),
    /// Driven by the latest audio intensity / spectrum.
    Audio(AudioVariant),
    /// Driven by the latest telemetry sample.
    Stats(StatsVariant),
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Off => write!(f, "off"),
            Mode::Static(color) => write!(f, "static {}", color),
            Mode::Animation(anim) => write!(f, "animation {:?}", anim.kind),
            Mode::Audio(variant) => write!(f, "audio {:?}", variant),
            Mode::Stats(variant) => write!(f, "stats {:?}", variant),
        }
    }
}

fn parse_hue(text: Option<&str>, default: f64) -> Result<f64, String> {
    match text {
        None => Ok(default),
        Some(text) => text
            .parse::<f64>()
            .ok()
            .filter(|hue| hue.is_finite())
            .ok_or_else(|| format!("Invalid hue '{}'", text)),
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, rest) = match s.split_once(':') {
            Some((kind, rest)) => (kind, Some(rest)),
            None => (s, None),
        };

        match (kind.to_ascii_lowercase().as_str(), rest) {
            ("off", None) => Ok(Mode::Off),
            ("static", Some(color)) => parse_color(color).map(Mode::Static),
            ("anim", Some(variant)) => {
                let (name, arg) = match variant.split_once(':') {
                    Some((name, arg)) => (name, Some(arg)),
                    None => (variant, None),
                };
                let kind = match (name.to_ascii_lowercase().as_str(), arg) {
                    ("fade", None) => AnimationKind::HueFade,
                    ("sparkle", None) => AnimationKind::Sparkle,
                    ("breathe", Some(color)) => AnimationKind::Breathe(parse_color(color)?),
                    ("blink", Some(color)) => AnimationKind::Blink(parse_color(color)?),
                    _ => return Err(format!("Unknown animation '{}'", variant)),
                };
                Ok(Mode::Animation(Animation::new(kind)))
            }
            ("audio", Some(variant)) => {
                let (name, arg) = match variant.split_once(':') {
                    Some((name, arg)) => (name, Some(arg)),
                    None => (variant, None),
                };
                match (name.to_ascii_lowercase().as_str(), arg) {
                    ("level", arg) => Ok(Mode::Audio(AudioVariant::Level {
                        hue: parse_hue(arg, 0.0)?,
                    })),
                    ("hue", None) => Ok(Mode::Audio(AudioVariant::HueShift)),
                    ("spectrum", None) => Ok(Mode::Audio(AudioVariant::Spectrum)),
                    _ => Err(format!("Unknown audio mode '{}'", variant)),
                }
            }
            ("stats", Some(variant)) => {
                let (name, arg) = match variant.split_once(':') {
                    Some((name, arg)) => (name, Some(arg)),
                    None => (variant, None),
                };
                match (name.to_ascii_lowercase().as_str(), arg) {
                    ("heat", None) => Ok(Mode::Stats(StatsVariant::Heat)),
                    ("level", arg) => Ok(Mode::Stats(StatsVariant::Level {
                        hue: parse_hue(arg, 240.0)?,
                    })),
                    _ => Err(format!("Unknown stats mode '{}'", variant)),
                }
            }
            _ => Err(format!("Unknown mode '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_color_lookup() {
        assert_eq!(static_color("Red"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(static_color("WHITE"), Some(Rgb::new(255, 255, 255)));
        assert_eq!(static_color("chartreuse"), None);
    }

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("blue"), Ok(Rgb::new(0, 0, 255)));
        assert_eq!(parse_color("#ff8000"), Ok(Rgb::new(255, 128, 0)));
        assert_eq!(parse_color("1, 2, 3"), Ok(Rgb::new(1, 2, 3)));
        assert!(parse_color("#ff80").is_err());
        assert!(parse_color("256,0,0").is_err());
        assert!(parse_color("nope").is_err());
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("off".parse::<Mode>(), Ok(Mode::Off));
        assert_eq!(
            "static:red".parse::<Mode>(),
            Ok(Mode::Static(Rgb::new(255, 0, 0)))
        );
        assert_eq!(
            "anim:fade".parse::<Mode>(),
            Ok(Mode::Animation(Animation::new(AnimationKind::HueFade)))
        );
        assert_eq!(
            "anim:breathe:#00ff00".parse::<Mode>(),
            Ok(Mode::Animation(Animation::new(AnimationKind::Breathe(
                Rgb::new(0, 255, 0)
            ))))
        );
        assert_eq!(
            "audio:level:120".parse::<Mode>(),
            Ok(Mode::Audio(AudioVariant::Level { hue: 120.0 }))
        );
        assert_eq!(
            "audio:spectrum".parse::<Mode>(),
            Ok(Mode::Audio(AudioVariant::Spectrum))
        );
        assert_eq!(
            "stats:heat".parse::<Mode>(),
            Ok(Mode::Stats(StatsVariant::Heat))
        );
        assert_eq!(
            "stats:level".parse::<Mode>(),
            Ok(Mode::Stats(StatsVariant::Level { hue: 240.0 }))
        );
    }

    #[test]
    fn test_parse_mode_errors() {
        for bad in ["", "static", "anim:breathe", "audio:loud", "stats:heat:3", "disco"] {
            assert!(bad.parse::<Mode>().is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_audio_variant_colors() {
        assert_eq!(AudioVariant::Level { hue: 0.0 }.color(1.0, Rgb::BLACK), Rgb::new(255, 0, 0));
        assert_eq!(AudioVariant::Level { hue: 0.0 }.color(0.0, Rgb::BLACK), Rgb::BLACK);
        assert_eq!(AudioVariant::HueShift.color(0.0, Rgb::BLACK), Rgb::new(0, 0, 255));
        assert_eq!(AudioVariant::HueShift.color(1.0, Rgb::BLACK), Rgb::new(255, 0, 0));
        assert_eq!(
            AudioVariant::Spectrum.color(0.3, Rgb::new(9, 8, 7)),
            Rgb::new(9, 8, 7)
        );
    }

    #[test]
    fn test_stats_variant_colors() {
        let idle = StatsSample::new(0.0, 0.0, 100.0);
        let busy = StatsSample::new(100.0, 0.0, 100.0);
        assert_eq!(StatsVariant::Heat.color(&idle), Rgb::new(0, 255, 0));
        assert_eq!(StatsVariant::Heat.color(&busy), Rgb::new(255, 0, 0));
        assert_eq!(
            StatsVariant::Level { hue: 240.0 }.color(&busy),
            Rgb::new(0, 0, 255)
        );
    }
}
