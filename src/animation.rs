//! Procedural animations.
//!
//! An animation is a pure function of its phase: the dispatcher counts ticks
//! since the mode was selected and turns that into a phase in `[0, 1)` plus the
//! number of completed cycles. Nothing here keeps state between frames.

use crate::mapping::{hsv_to_rgb, Rgb};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::Duration;

/// Default length of one animation cycle.
pub const DEFAULT_CYCLE: Duration = Duration::from_secs(5);

/// The available animation variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    /// Hue sweeps once around the color wheel per cycle.
    HueFade,
    /// Brightness of `color` rises and falls along a raised cosine.
    Breathe(Rgb),
    /// `color` for the first half of the cycle, dark for the second.
    Blink(Rgb),
    /// A new random hue every cycle.
    Sparkle,
}

/// An animation variant together with its cycle length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    /// Which animation to play
    pub kind: AnimationKind,
    /// Duration of one full cycle
    pub cycle: Duration,
}

impl Animation {
    /// Animation of `kind` with the default cycle length.
    pub fn new(kind: AnimationKind) -> Self {
        Self {
            kind,
            cycle: DEFAULT_CYCLE,
        }
    }

    /// Override the cycle length.
    pub fn with_cycle(mut self, cycle: Duration) -> Self {
        self.cycle = cycle;
        self
    }

    /// Position after `elapsed`: (completed cycles, phase in `[0, 1)`).
    ///
    /// A zero cycle length freezes the animation at phase 0.
    pub fn phase_at(&self, elapsed: Duration) -> (u64, f64) {
        let cycle = self.cycle.as_secs_f64();
        if cycle <= 0.0 {
            return (0, 0.0);
        }
        let position = elapsed.as_secs_f64() / cycle;
        (position.floor() as u64, position.fract())
    }

    /// Color after `elapsed` time in this mode.
    pub fn color_at(&self, elapsed: Duration) -> Rgb {
        let (cycle_index, phase) = self.phase_at(elapsed);
        self.kind.color(cycle_index, phase)
    }
}

impl AnimationKind {
    /// Color at `phase` of cycle number `cycle_index`.
    pub fn color(self, cycle_index: u64, phase: f64) -> Rgb {
        match self {
            AnimationKind::HueFade => hsv_to_rgb(phase * 360.0, 1.0, 1.0),
            AnimationKind::Breathe(color) => {
                let level = 0.5 - 0.5 * (2.0 * PI * phase).cos();
                color.scaled(level)
            }
            AnimationKind::Blink(color) => {
                if phase < 0.5 {
                    color
                } else {
                    Rgb::BLACK
                }
            }
            AnimationKind::Sparkle => {
                let hue = StdRng::seed_from_u64(cycle_index).gen_range(0.0..360.0);
                hsv_to_rgb(hue, 1.0, 1.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_at() {
        let anim = Animation::new(AnimationKind::HueFade).with_cycle(Duration::from_secs(2));
        assert_eq!(anim.phase_at(Duration::ZERO), (0, 0.0));
        assert_eq!(anim.phase_at(Duration::from_millis(500)), (0, 0.25));
        assert_eq!(anim.phase_at(Duration::from_millis(5000)), (2, 0.5));
    }

    #[test]
    fn test_zero_cycle_is_frozen() {
        let anim = Animation::new(AnimationKind::HueFade).with_cycle(Duration::ZERO);
        assert_eq!(anim.phase_at(Duration::from_secs(10)), (0, 0.0));
    }

    #[test]
    fn test_hue_fade_sweeps_wheel() {
        let kind = AnimationKind::HueFade;
        assert_eq!(kind.color(0, 0.0), Rgb::new(255, 0, 0));
        assert_eq!(kind.color(0, 1.0 / 3.0), Rgb::new(0, 255, 0));
        assert_eq!(kind.color(0, 2.0 / 3.0), Rgb::new(0, 0, 255));
    }

    #[test]
    fn test_breathe() {
        let kind = AnimationKind::Breathe(Rgb::new(200, 100, 0));
        assert_eq!(kind.color(0, 0.0), Rgb::BLACK);
        assert_eq!(kind.color(0, 0.5), Rgb::new(200, 100, 0));
        assert_eq!(kind.color(0, 0.25), Rgb::new(100, 50, 0));
    }

    #[test]
    fn test_blink() {
        let kind = AnimationKind::Blink(Rgb::new(0, 0, 255));
        assert_eq!(kind.color(3, 0.1), Rgb::new(0, 0, 255));
        assert_eq!(kind.color(3, 0.9), Rgb::BLACK);
    }

    #[test]
    fn test_sparkle_is_stable_within_a_cycle() {
        let kind = AnimationKind::Sparkle;
        assert_eq!(kind.color(7, 0.1), kind.color(7, 0.9));
        assert!(!kind.color(7, 0.5).is_black());
    }
}
