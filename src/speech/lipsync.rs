//! Mouth animation while an utterance plays
//!
//! Two strategies share one contract: playback runs on its own thread, the
//! calling thread drives the mouth servo, and the mouth is shut on every
//! exit path (normal end, error, stop request).

use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::hardware::{Channel, HardwareLink, MOUTH_CLOSED, MOUTH_OPEN};
use crate::lifecycle::StopToken;
use crate::state::LanguageMode;

use super::engine::{PcmBuffer, SpeechEngine, SpeechError};

/// Samples per channel examined per amplitude window
pub const AMPLITUDE_WINDOW_FRAMES: usize = 1024;

/// Peak-to-peak level (16-bit units) above which the mouth opens
pub const AMPLITUDE_THRESHOLD: i32 = 2000;

const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Open/close cadence of the phoneme-timed strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhonemeTiming {
    pub open: Duration,
    pub close: Duration,
}

impl Default for PhonemeTiming {
    fn default() -> Self {
        Self {
            open: Duration::from_millis(100),
            close: Duration::from_millis(50),
        }
    }
}

/// How the mouth follows the audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LipSync {
    /// Fixed open/close pulse per phoneme, not locked to the audio
    PhonemeTimed(PhonemeTiming),
    /// Open while the synthesized waveform is loud
    AmplitudeDriven,
}

impl LipSync {
    pub fn for_language(mode: LanguageMode, timing: PhonemeTiming) -> Self {
        match mode {
            LanguageMode::Primary => LipSync::PhonemeTimed(timing),
            LanguageMode::Secondary => LipSync::AmplitudeDriven,
        }
    }

    /// Speak `text` and animate the mouth until playback completes
    pub fn perform(
        &self,
        engine: &dyn SpeechEngine,
        link: &HardwareLink,
        text: &str,
        voice: &str,
        stop: &StopToken,
    ) -> Result<(), SpeechError> {
        let mut mouth = Mouth::new(link);

        match self {
            LipSync::PhonemeTimed(timing) => phoneme_timed(engine, &mut mouth, text, voice, *timing, stop),
            LipSync::AmplitudeDriven => amplitude_driven(engine, &mut mouth, text, voice, stop),
        }
    }
}

/// Mouth servo that is always left shut when dropped
struct Mouth<'a> {
    link: &'a HardwareLink,
    open: bool,
}

impl<'a> Mouth<'a> {
    fn new(link: &'a HardwareLink) -> Self {
        Self { link, open: false }
    }

    fn set(&mut self, open: bool) {
        let angle = if open { MOUTH_OPEN } else { MOUTH_CLOSED };
        self.link.send(Channel::Mouth, angle);
        self.open = open;
    }

    /// Only write when the position changes
    fn follow(&mut self, open: bool) {
        if open != self.open {
            self.set(open);
        }
    }
}

impl Drop for Mouth<'_> {
    fn drop(&mut self) {
        self.set(false);
    }
}

/// Audio output running on its own thread for one utterance
struct Playback<'scope> {
    handle: ScopedJoinHandle<'scope, Result<(), SpeechError>>,
}

impl<'scope> Playback<'scope> {
    fn spawn<'env, F>(scope: &'scope Scope<'scope, 'env>, play: F) -> Result<Self, SpeechError>
    where
        F: FnOnce() -> Result<(), SpeechError> + Send + 'scope,
    {
        let handle = thread::Builder::new()
            .name("speech-playback".to_string())
            .spawn_scoped(scope, play)?;
        Ok(Self { handle })
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the audio ends, interrupting the engine if `stop` fires.
    ///
    /// After a stop request the engine's error (a killed player) is expected
    /// and swallowed.
    fn wait(self, engine: &dyn SpeechEngine, stop: &StopToken) -> Result<(), SpeechError> {
        let mut interrupted = false;
        while !self.is_finished() {
            if stop.is_stopped() && !interrupted {
                engine.stop();
                interrupted = true;
            }
            thread::sleep(PLAYBACK_POLL_INTERVAL);
        }

        match self.handle.join() {
            Ok(Err(e)) if stop.is_stopped() => {
                debug!(error = %e, "playback ended by stop request");
                Ok(())
            }
            Ok(result) => result,
            Err(_) => Err(SpeechError::PlaybackPanicked),
        }
    }
}

fn phoneme_timed(
    engine: &dyn SpeechEngine,
    mouth: &mut Mouth<'_>,
    text: &str,
    voice: &str,
    timing: PhonemeTiming,
    stop: &StopToken,
) -> Result<(), SpeechError> {
    let phonemes = engine.phonemes(text, voice)?;
    debug!(count = phonemes.len(), "phoneme timeline ready");

    thread::scope(|scope| {
        let playback = Playback::spawn(scope, || engine.play(text, voice))?;

        for phoneme in &phonemes {
            trace!(symbol = %phoneme.symbol, "phoneme");
            mouth.set(true);
            if !stop.sleep(timing.open) {
                break;
            }
            mouth.set(false);
            if !stop.sleep(timing.close) {
                break;
            }
        }

        mouth.set(false);
        playback.wait(engine, stop)
    })
}

fn amplitude_driven(
    engine: &dyn SpeechEngine,
    mouth: &mut Mouth<'_>,
    text: &str,
    voice: &str,
    stop: &StopToken,
) -> Result<(), SpeechError> {
    let wav = engine.synthesize(text, voice)?;
    let pcm = PcmBuffer::from_wav(&wav)?;
    debug!(
        samples = pcm.samples.len(),
        channels = pcm.channels,
        sample_rate = pcm.sample_rate,
        "synthesized audio decoded"
    );

    let window = pcm.window_len(AMPLITUDE_WINDOW_FRAMES);

    thread::scope(|scope| {
        let playback = Playback::spawn(scope, || engine.play_wav(&wav))?;

        for chunk in pcm.samples.chunks(window.max(1)) {
            if playback.is_finished() {
                break;
            }
            mouth.follow(peak_to_peak(chunk) > AMPLITUDE_THRESHOLD);
            if !stop.sleep(pcm.duration_of(chunk.len())) {
                break;
            }
        }

        mouth.follow(false);
        if !stop.is_stopped() && !playback.is_finished() {
            debug!("mouth timeline finished ahead of playback");
        }
        let result = playback.wait(engine, stop);
        if let Err(e) = &result {
            warn!(error = %e, "amplitude playback failed");
        }
        result
    })
}

/// Difference between the loudest and quietest sample
pub fn peak_to_peak(samples: &[i16]) -> i32 {
    let (min, max) = samples
        .iter()
        .fold((i16::MAX, i16::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));

    if samples.is_empty() {
        0
    } else {
        max as i32 - min as i32
    }
}
