//! Wake-word and command loop
//!
//! Idle listens for the wake phrase. Once heard, the assistant acknowledges,
//! passes through Awake into CommandMode and handles commands until the user
//! says "cancel" (back to Idle) or "exit" (cooperative shutdown).

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Local;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::commands::{canonical_words, CommandContext, CommandHandler, CommandKind, CommandMatcher, Outcome};
use crate::config::Persona;
use crate::events::DialogueEvent;
use crate::hardware::HardwareLink;
use crate::lifecycle::StopToken;
use crate::state::{DialogueState, SharedState, StateMachine};
use crate::speech::SpeechActuator;

use super::listener::{ListenError, Listener};

/// Word that leaves CommandMode wherever it appears in a transcript
pub const CANCEL_TOKEN: &str = "cancel";

/// Whether the loop should keep going after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Tunables of the dialogue loop
#[derive(Debug, Clone)]
pub struct DialogueSettings {
    pub persona: Persona,
    /// Consecutive empty attempts before the "nothing heard" notice
    pub silence_limit: u32,
    /// Speak "Listening for ..." before every attempt
    pub announce_listening: bool,
}

pub struct DialogueController {
    machine: StateMachine,
    listener: Listener,
    matcher: CommandMatcher<CommandKind>,
    speech: Arc<SpeechActuator>,
    shared: Arc<SharedState>,
    link: Arc<HardwareLink>,
    settings: DialogueSettings,
    /// Lowercased wake phrase and aliases
    wake_phrases: Vec<String>,
    silent_attempts: u32,
    stop: StopToken,
}

impl DialogueController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listener: Listener,
        matcher: CommandMatcher<CommandKind>,
        speech: Arc<SpeechActuator>,
        shared: Arc<SharedState>,
        link: Arc<HardwareLink>,
        settings: DialogueSettings,
        event_tx: broadcast::Sender<DialogueEvent>,
        stop: StopToken,
    ) -> Self {
        let wake_phrases = settings
            .persona
            .wake_phrases()
            .map(canonical_words)
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            machine: StateMachine::new(event_tx),
            listener,
            matcher,
            speech,
            shared,
            link,
            settings,
            wake_phrases,
            silent_attempts: 0,
            stop,
        }
    }

    pub fn state(&self) -> DialogueState {
        self.machine.state()
    }

    /// Run the loop on a dedicated thread until stopped or told to exit
    pub fn spawn(mut self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("dialogue".to_string())
            .spawn(move || {
                info!("dialogue thread started");
                if let Err(e) = self.run() {
                    error!(error = %e, "dialogue loop failed");
                    // Without a microphone there is nothing left to do
                    self.stop.stop();
                }
                info!("dialogue thread stopped");
            })
    }

    /// Loop over listening cycles until a stop request or the exit command
    pub fn run(&mut self) -> Result<(), ListenError> {
        let vocabulary = self.vocabulary();
        self.listener.set_vocabulary(&vocabulary);

        info!(state = %self.state(), "dialogue loop started");

        while !self.stop.is_stopped() {
            if self.step()? == Flow::Exit {
                break;
            }
        }

        Ok(())
    }

    /// Perform one listening attempt in the current state
    pub fn step(&mut self) -> Result<Flow, ListenError> {
        match self.machine.state() {
            DialogueState::Idle => self.idle_step(),
            DialogueState::Awake => {
                self.machine.enter_command_mode();
                Ok(Flow::Continue)
            }
            DialogueState::CommandMode => self.command_step(),
        }
    }

    fn idle_step(&mut self) -> Result<Flow, ListenError> {
        if self.settings.announce_listening {
            self.say("Listening for wake word");
        }

        let heard = self.listener.listen()?;
        debug!(transcript = heard.text(), "heard while idle");

        if heard.is_empty() || !self.is_wake_phrase(heard.text()) {
            return Ok(Flow::Continue);
        }

        self.machine.wake(heard.text());
        let ack = self.settings.persona.wake_ack.clone();
        self.say(&ack);

        self.silent_attempts = 0;
        self.machine.enter_command_mode();
        Ok(Flow::Continue)
    }

    fn command_step(&mut self) -> Result<Flow, ListenError> {
        if self.settings.announce_listening {
            self.say("Listening for command");
        }

        let heard = self.listener.listen()?;
        info!(transcript = heard.text(), "heard command");

        if heard.is_empty() {
            self.silent_attempts += 1;
            if self.silent_attempts >= self.settings.silence_limit {
                self.machine.emit(DialogueEvent::SilenceNotice);
                let notice = self.settings.persona.silence_notice.clone();
                self.say(&notice);
                self.silent_attempts = 0;
            }
            return Ok(Flow::Continue);
        }
        self.silent_attempts = 0;

        if heard.text().to_lowercase().contains(CANCEL_TOKEN) {
            let notice = self.settings.persona.cancel_notice.clone();
            self.say(&notice);
            self.machine.return_to_idle();
            return Ok(Flow::Continue);
        }

        let Some((kind, phrase, score)) = self
            .matcher
            .match_command(heard.text())
            .map(|m| (*m.handler, m.phrase.to_string(), m.score))
        else {
            self.machine.emit(DialogueEvent::CommandNotRecognized {
                text: self.matcher.normalize(heard.text()),
            });
            let prompt = self.settings.persona.not_understood.clone();
            self.say(&prompt);
            return Ok(Flow::Continue);
        };

        self.machine.emit(DialogueEvent::CommandMatched { phrase, score });

        let outcome = {
            let ctx = CommandContext {
                shared: &self.shared,
                link: &self.link,
                persona: &self.settings.persona,
                voice_count: self.speech.voice_count(),
                now: Local::now(),
            };
            kind.execute(&ctx)
        };
        debug!(?kind, ?outcome, "command executed");

        match outcome {
            Outcome::Reply(reply) => {
                self.say(&reply);
                Ok(Flow::Continue)
            }
            Outcome::Exit(farewell) => {
                self.say(&farewell);
                self.machine.return_to_idle();
                self.machine.emit(DialogueEvent::ShutdownRequested);
                info!("exit command received, requesting shutdown");
                self.stop.stop();
                Ok(Flow::Exit)
            }
        }
    }

    fn is_wake_phrase(&self, transcript: &str) -> bool {
        let heard = canonical_words(transcript);
        self.wake_phrases.iter().any(|phrase| heard.contains(phrase.as_str()))
    }

    /// Phrases worth biasing the recognizer towards
    fn vocabulary(&self) -> Vec<String> {
        let mut phrases: Vec<String> = self.matcher.table().phrases().map(str::to_string).collect();
        phrases.extend(self.wake_phrases.iter().cloned());
        phrases.push(CANCEL_TOKEN.to_string());
        phrases
    }

    fn say(&self, text: &str) {
        // Failures are logged by the actuator; the dialogue carries on
        let _ = self.speech.speak(text);
    }
}
