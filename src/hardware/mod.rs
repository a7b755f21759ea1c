//! Hardware Links
//!
//! Serial communication with the lighting controller and the gamepad bridge.

pub mod capabilities;
pub mod mock;
pub mod serial_link;

pub use capabilities::{FrameWriter, TokenSource};
pub use serial_link::{list_ports, PortDescriptor, SerialLink, SerialLinkBuilder, DEFAULT_BAUD_RATE};
