//! # caselights
//!
//! Drives a serial-attached RGB lighting controller from one of several
//! signal sources: a static color, a procedural animation, live audio
//! loudness or spectrum, or a system telemetry value.
//!
//! ## Crate Structure
//!
//! - **`mapping`**: affine value mapping and HSV to RGB conversion.
//! - **`protocol`**: the line protocol shared with the firmware (color frames,
//!   UV command, inbound gamepad tokens).
//! - **`hardware`**: the serial link, its capability traits and a mock link.
//! - **`signal`**: latest-value cells shared between contexts and the
//!   telemetry probe boundary.
//! - **`audio`**: loudness reduction, smoothing and spectrum analysis.
//! - **`animation`**: stateless animation curves.
//! - **`mode`**: the selectable lighting modes.
//! - **`dispatcher`**: the periodic loop that turns the active mode into frames.
//! - **`reader`**: the read-mode background loop for controller input.
//! - **`config`** / **`logging`** / **`error`**: ambient infrastructure.
//!
//! ## Example
//!
//! ```
//! use caselights::dispatcher::{LightingDispatcher, SignalSources};
//! use caselights::hardware::mock::MockLink;
//! use caselights::mapping::Rgb;
//! use caselights::mode::Mode;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> caselights::error::AppResult<()> {
//! let link = MockLink::new();
//! let dispatcher = LightingDispatcher::new(link.clone(), SignalSources::default());
//! dispatcher.set_mode(Mode::Static(Rgb::new(255, 0, 0)));
//! dispatcher.tick().await?;
//! assert_eq!(link.frames(), vec!["255,0,0\n"]);
//! # Ok(())
//! # }
//! ```

pub mod animation;
pub mod audio;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod mapping;
pub mod mode;
pub mod protocol;
pub mod reader;
pub mod signal;
