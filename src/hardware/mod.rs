//! Serial link to the microcontroller driving the pan, tilt and mouth servos
//!
//! Frames are ASCII lines of the form `<channel>:<angle>\n`. The link never
//! reads anything back; if the device is missing every write becomes a
//! logged no-op.

mod link;
mod servo;

pub use link::HardwareLink;
pub use servo::{Channel, MOUTH_CLOSED, MOUTH_OPEN, PAN_CENTER, TILT_CENTER};
