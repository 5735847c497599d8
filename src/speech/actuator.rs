//! Speaking with a moving mouth
//!
//! `SpeechActuator` is the only producer of audio output. It holds the
//! speech gate for the whole utterance and picks the voice and lip-sync
//! strategy from the current language mode.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::hardware::HardwareLink;
use crate::lifecycle::StopToken;
use crate::state::{LanguageMode, SharedState};

use super::engine::{SpeechEngine, SpeechError};
use super::gate::SpeechGate;
use super::lipsync::{LipSync, PhonemeTiming};

/// Voices for each language mode
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub primary: String,
    pub secondary: String,
}

pub struct SpeechActuator {
    engine: Arc<dyn SpeechEngine>,
    link: Arc<HardwareLink>,
    gate: Arc<SpeechGate>,
    shared: Arc<SharedState>,
    /// Primary-language voices cycled by "change voice"; configured voice first
    voice_cycle: Vec<String>,
    secondary_voice: String,
    timing: PhonemeTiming,
    stop: StopToken,
}

impl SpeechActuator {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        link: Arc<HardwareLink>,
        gate: Arc<SpeechGate>,
        shared: Arc<SharedState>,
        voices: VoiceSettings,
        stop: StopToken,
    ) -> Self {
        let mut voice_cycle = vec![voices.primary.clone()];
        voice_cycle.extend(
            engine
                .voices()
                .into_iter()
                .filter(|v| *v != voices.primary),
        );
        debug!(voices = voice_cycle.len(), "speech voices available");

        Self {
            engine,
            link,
            gate,
            shared,
            voice_cycle,
            secondary_voice: voices.secondary,
            timing: PhonemeTiming::default(),
            stop,
        }
    }

    /// Override the phoneme pulse cadence
    pub fn with_timing(mut self, timing: PhonemeTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Number of voices "change voice" cycles through
    pub fn voice_count(&self) -> usize {
        self.voice_cycle.len()
    }

    #[cfg(test)]
    pub fn gate(&self) -> &Arc<SpeechGate> {
        &self.gate
    }

    /// Speak in the current language mode
    pub fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.speak_in(text, self.shared.language())
    }

    /// Speak `text` and block until audio and mouth motion are done.
    ///
    /// A stop request cuts the utterance short and is not an error.
    pub fn speak_in(&self, text: &str, mode: LanguageMode) -> Result<(), SpeechError> {
        let text = text.trim();
        if text.is_empty() || self.stop.is_stopped() {
            return Ok(());
        }

        let _guard = self.gate.acquire();

        let voice = self.voice_for(mode);
        let strategy = LipSync::for_language(mode, self.timing);
        info!(text, %mode, voice, ?strategy, "speaking");

        let result = strategy.perform(self.engine.as_ref(), &self.link, text, voice, &self.stop);
        match &result {
            Ok(()) if self.stop.is_stopped() => debug!("utterance cut short by stop request"),
            Ok(()) => {}
            Err(e) => warn!(error = %e, text, "speech failed"),
        }
        result
    }

    fn voice_for(&self, mode: LanguageMode) -> &str {
        match mode {
            LanguageMode::Primary => {
                let index = self.shared.voice_index() % self.voice_cycle.len();
                &self.voice_cycle[index]
            }
            LanguageMode::Secondary => &self.secondary_voice,
        }
    }
}
