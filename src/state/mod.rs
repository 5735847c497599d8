//! Dialogue state machine and the state shared between worker threads
//!
//! The dialogue cycles strictly through three states:
//! - Idle: waiting for the wake phrase
//! - Awake: wake phrase heard, acknowledgment spoken
//! - CommandMode: listening for commands until cancelled

mod machine;
mod shared;

pub use machine::{DialogueState, StateMachine};
pub use shared::{HeadPose, LanguageMode, SharedState};
