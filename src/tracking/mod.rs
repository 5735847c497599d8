//! Face tracking with the pan/tilt servos

mod camera;
mod controller;

pub use camera::{NoFaceDetector, UnavailableCamera};
pub use controller::TrackingController;
