//! Events module for dialogue transitions
//!
//! Provides structured event types broadcast by the dialogue loop so the
//! supervisor in `main` can log them and react to a shutdown request.

use serde::{Deserialize, Serialize};

/// Events emitted by the dialogue loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueEvent {
    /// Wake phrase recognised in Idle
    WakeDetected {
        /// Transcript that contained the wake phrase
        transcript: String,
    },

    /// Listening for commands
    CommandModeEntered,

    /// A transcript matched a command phrase
    CommandMatched {
        /// Canonical phrase from the command table
        phrase: String,
        /// Similarity score in [0, 1]
        score: f64,
    },

    /// Nothing in the command table was close enough
    CommandNotRecognized {
        /// Normalized transcript
        text: String,
    },

    /// Too many silent attempts in a row
    SilenceNotice,

    /// Returned to Idle
    CommandModeExited {
        /// Duration in milliseconds that command mode was active
        duration_ms: u64,
    },

    /// The exit command asked the whole process to stop
    ShutdownRequested,
}

impl std::fmt::Display for DialogueEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialogueEvent::WakeDetected { .. } => write!(f, "WAKE_DETECTED"),
            DialogueEvent::CommandModeEntered => write!(f, "COMMAND_MODE_ENTERED"),
            DialogueEvent::CommandMatched { phrase, score } => {
                write!(f, "COMMAND_MATCHED ({} @ {:.2})", phrase, score)
            }
            DialogueEvent::CommandNotRecognized { .. } => write!(f, "COMMAND_NOT_RECOGNIZED"),
            DialogueEvent::SilenceNotice => write!(f, "SILENCE_NOTICE"),
            DialogueEvent::CommandModeExited { duration_ms } => {
                write!(f, "COMMAND_MODE_EXITED ({}ms)", duration_ms)
            }
            DialogueEvent::ShutdownRequested => write!(f, "SHUTDOWN_REQUESTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DialogueEvent::CommandModeExited { duration_ms: 1500 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("command_mode_exited"));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"shutdown_requested"}"#;
        let event: DialogueEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, DialogueEvent::ShutdownRequested));
    }

    #[test]
    fn test_display_includes_match_details() {
        let event = DialogueEvent::CommandMatched {
            phrase: "hello".to_string(),
            score: 1.0,
        };
        assert_eq!(event.to_string(), "COMMAND_MATCHED (hello @ 1.00)");
    }
}
