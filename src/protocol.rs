//! Serial line protocol shared with the lighting firmware.
//!
//! Every command is one ASCII line terminated by `\n`.
//!
//! Outbound (host to controller):
//! - color frame, `csv` format: `R,G,B\n` (e.g. `255,0,0\n`)
//! - color frame, `tagged` format: `RGB R G B\n` (e.g. `RGB 255 0 0\n`)
//! - auxiliary UV light: `UV 1\n` / `UV 0\n`
//!
//! The off sentinel is the all-zero frame in the active format and never goes
//! through the value mapper.
//!
//! Inbound (read mode, controller to host): one token per line,
//! `B<index>:<0|1>` for a button and `A<index>:<value>` for an axis. Anything
//! else is discarded by the reader.

use crate::mapping::Rgb;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Line terminator for every outbound command.
pub const LINE_TERMINATOR: &str = "\n";

/// The "all channels zero" frame in the default format.
pub const OFF_FRAME: &str = "0,0,0\n";

/// Wire syntax of a color frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// `R,G,B\n`
    #[default]
    Csv,
    /// `RGB R G B\n`
    Tagged,
}

impl FrameFormat {
    /// Encode one color frame, terminator included.
    pub fn encode(self, color: Rgb) -> String {
        match self {
            FrameFormat::Csv => format!("{},{},{}{}", color.r, color.g, color.b, LINE_TERMINATOR),
            FrameFormat::Tagged => {
                format!("RGB {} {} {}{}", color.r, color.g, color.b, LINE_TERMINATOR)
            }
        }
    }

    /// The off sentinel in this format.
    pub fn off_frame(self) -> &'static str {
        match self {
            FrameFormat::Csv => OFF_FRAME,
            FrameFormat::Tagged => "RGB 0 0 0\n",
        }
    }
}

impl FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(FrameFormat::Csv),
            "tagged" => Ok(FrameFormat::Tagged),
            other => Err(format!("Unknown frame format '{}'. Expected csv or tagged", other)),
        }
    }
}

/// Command switching the auxiliary UV light.
pub fn uv_command(on: bool) -> &'static str {
    if on {
        "UV 1\n"
    } else {
        "UV 0\n"
    }
}

/// A decoded input-device event from the read-mode stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamepadEvent {
    /// A button changed state.
    Button {
        /// Button index as reported by the controller
        index: u8,
        /// `true` when pressed
        pressed: bool,
    },
    /// An axis moved.
    Axis {
        /// Axis index as reported by the controller
        index: u8,
        /// Signed axis position
        value: i16,
    },
}

impl GamepadEvent {
    /// Decode one inbound token. Returns `None` for anything unrecognised.
    pub fn decode(token: &str) -> Option<Self> {
        let token = token.trim();
        let (head, value) = token.split_once(':')?;
        let mut chars = head.chars();
        let kind = chars.next()?;
        let index: u8 = chars.as_str().parse().ok()?;

        match kind {
            'B' | 'b' => match value {
                "0" => Some(GamepadEvent::Button { index, pressed: false }),
                "1" => Some(GamepadEvent::Button { index, pressed: true }),
                _ => None,
            },
            'A' | 'a' => value
                .parse::<i16>()
                .ok()
                .map(|value| GamepadEvent::Axis { index, value }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_frame() {
        assert_eq!(FrameFormat::Csv.encode(Rgb::new(255, 0, 0)), "255,0,0\n");
        assert_eq!(FrameFormat::Csv.encode(Rgb::BLACK), OFF_FRAME);
    }

    #[test]
    fn test_tagged_frame() {
        assert_eq!(
            FrameFormat::Tagged.encode(Rgb::new(1, 22, 255)),
            "RGB 1 22 255\n"
        );
        assert_eq!(
            FrameFormat::Tagged.encode(Rgb::BLACK),
            FrameFormat::Tagged.off_frame()
        );
    }

    #[test]
    fn test_frame_format_parse() {
        assert_eq!("CSV".parse::<FrameFormat>(), Ok(FrameFormat::Csv));
        assert_eq!("tagged".parse::<FrameFormat>(), Ok(FrameFormat::Tagged));
        assert!("binary".parse::<FrameFormat>().is_err());
    }

    #[test]
    fn test_uv_command() {
        assert_eq!(uv_command(true), "UV 1\n");
        assert_eq!(uv_command(false), "UV 0\n");
    }

    #[test]
    fn test_decode_button() {
        assert_eq!(
            GamepadEvent::decode("B3:1\r\n"),
            Some(GamepadEvent::Button { index: 3, pressed: true })
        );
        assert_eq!(
            GamepadEvent::decode("b12:0"),
            Some(GamepadEvent::Button { index: 12, pressed: false })
        );
    }

    #[test]
    fn test_decode_axis() {
        assert_eq!(
            GamepadEvent::decode("A0:-32768"),
            Some(GamepadEvent::Axis { index: 0, value: -32768 })
        );
        assert_eq!(
            GamepadEvent::decode("A5:1200"),
            Some(GamepadEvent::Axis { index: 5, value: 1200 })
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for token in ["", "B", "B:1", "B1:2", "A1:40000", "X1:1", "hello", "A1", "B-1:1"] {
            assert_eq!(GamepadEvent::decode(token), None, "token {:?}", token);
        }
    }
}
