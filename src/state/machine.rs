//! Core dialogue state machine
//!
//! Tracks the Idle → Awake → CommandMode → Idle cycle, rejects any
//! transition that would skip a step, and emits a `DialogueEvent` for
//! each accepted one.

use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::DialogueEvent;

/// The three states of one listening cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogueState {
    /// Waiting for the wake phrase
    #[default]
    Idle,
    /// Wake phrase heard; moves straight on to CommandMode
    Awake,
    /// Listening for commands until cancel or exit
    CommandMode,
}

impl DialogueState {
    /// The only state this one may move to
    pub fn successor(self) -> DialogueState {
        match self {
            DialogueState::Idle => DialogueState::Awake,
            DialogueState::Awake => DialogueState::CommandMode,
            DialogueState::CommandMode => DialogueState::Idle,
        }
    }
}

impl std::fmt::Display for DialogueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialogueState::Idle => write!(f, "Idle"),
            DialogueState::Awake => write!(f, "Awake"),
            DialogueState::CommandMode => write!(f, "CommandMode"),
        }
    }
}

/// The state machine that sequences dialogue transitions
pub struct StateMachine {
    /// Current state
    state: DialogueState,
    /// Time when the current non-Idle state was entered
    state_entered_at: Option<Instant>,
    /// Channel for emitting dialogue events
    event_tx: broadcast::Sender<DialogueEvent>,
}

impl StateMachine {
    /// Create a new state machine in Idle
    pub fn new(event_tx: broadcast::Sender<DialogueEvent>) -> Self {
        Self {
            state: DialogueState::Idle,
            state_entered_at: None,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> DialogueState {
        self.state
    }

    /// Broadcast an event; having no subscribers is not an error
    pub fn emit(&self, event: DialogueEvent) {
        debug!(?event, "emitting dialogue event");
        let _ = self.event_tx.send(event);
    }

    /// Idle → Awake, recording the transcript that woke us
    pub fn wake(&mut self, transcript: &str) -> bool {
        if !self.transition_to(DialogueState::Awake) {
            return false;
        }
        self.emit(DialogueEvent::WakeDetected {
            transcript: transcript.to_string(),
        });
        true
    }

    /// Awake → CommandMode
    pub fn enter_command_mode(&mut self) -> bool {
        if !self.transition_to(DialogueState::CommandMode) {
            return false;
        }
        self.emit(DialogueEvent::CommandModeEntered);
        true
    }

    /// CommandMode → Idle
    pub fn return_to_idle(&mut self) -> bool {
        let duration_ms = self.elapsed_ms();
        if !self.transition_to(DialogueState::Idle) {
            return false;
        }
        self.emit(DialogueEvent::CommandModeExited { duration_ms });
        true
    }

    fn elapsed_ms(&self) -> u64 {
        self.state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Perform a state transition if it is the current state's successor
    fn transition_to(&mut self, new_state: DialogueState) -> bool {
        let old_state = self.state;
        if old_state.successor() != new_state {
            warn!(from = %old_state, to = %new_state, "rejected out-of-order transition");
            return false;
        }

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = self.elapsed_ms(),
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = if new_state != DialogueState::Idle {
            Some(Instant::now())
        } else {
            None
        };

        true
    }
}
