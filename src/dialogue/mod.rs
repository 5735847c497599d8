//! Listening and the wake/command dialogue loop

mod controller;
mod listener;

pub use controller::{DialogueController, DialogueSettings};
pub use listener::{ListenError, Listener, Microphone, Recognizer, FRAME_SAMPLES};
