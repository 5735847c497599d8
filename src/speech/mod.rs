//! Speech output: the speaking/listening gate, the TTS collaborator
//! interface, lip-sync strategies and the actuator tying them together

mod actuator;
mod engine;
mod espeak;
mod gate;
mod lipsync;

pub use actuator::{SpeechActuator, VoiceSettings};
pub use espeak::EspeakEngine;
pub use gate::SpeechGate;
pub use lipsync::PhonemeTiming;

#[cfg(test)]
pub(crate) use engine::testing;
