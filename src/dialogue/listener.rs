//! Bounded listening attempts over a microphone and a speech recognizer

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::lifecycle::StopToken;
use crate::speech::SpeechGate;

/// Samples per frame handed to the recognizer
pub const FRAME_SAMPLES: usize = 4096;

/// Errors from the audio input side
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("microphone failed: {0}")]
    Microphone(String),

    #[error("recognizer failed: {0}")]
    Recognizer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of 16 kHz mono PCM frames
pub trait Microphone: Send {
    /// Next frame, blocking until one is available
    fn read_frame(&mut self) -> Result<Vec<i16>, ListenError>;

    /// Throw away audio captured before now
    fn discard_pending(&mut self) {}
}

/// Streaming speech-to-text
pub trait Recognizer: Send {
    /// Phrases the recognizer should expect
    fn set_vocabulary(&mut self, _phrases: &[String]) {}

    /// Start a fresh utterance window
    fn reset(&mut self) {}

    /// Forget audio of any unfinished utterance, e.g. after we spoke
    fn discard_utterance(&mut self) {}

    /// Feed a frame; yields the transcript once the utterance is final
    fn accept_frame(&mut self, frame: &[i16]) -> Result<Option<String>, ListenError>;
}

/// What one listening attempt heard; empty on timeout or silence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognitionResult {
    transcript: String,
}

impl RecognitionResult {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into().trim().to_string(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.transcript
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }
}

/// Runs listening attempts that never overlap our own speech
pub struct Listener {
    microphone: Box<dyn Microphone>,
    recognizer: Box<dyn Recognizer>,
    gate: Arc<SpeechGate>,
    stop: StopToken,
    timeout: Duration,
    /// Gate epoch at the start of the previous window
    last_epoch: Option<u64>,
}

impl Listener {
    pub fn new(
        microphone: Box<dyn Microphone>,
        recognizer: Box<dyn Recognizer>,
        gate: Arc<SpeechGate>,
        stop: StopToken,
        timeout: Duration,
    ) -> Self {
        Self {
            microphone,
            recognizer,
            gate,
            stop,
            timeout,
            last_epoch: None,
        }
    }

    pub fn set_vocabulary(&mut self, phrases: &[String]) {
        self.recognizer.set_vocabulary(phrases);
    }

    /// One bounded attempt.
    ///
    /// Waits for any speech in progress to finish before opening the window,
    /// and discards the result if speech started while the window was open.
    pub fn listen(&mut self) -> Result<RecognitionResult, ListenError> {
        if !self.gate.wait_until_released(&self.stop) {
            return Ok(RecognitionResult::empty());
        }

        let epoch = self.gate.epoch();
        self.microphone.discard_pending();
        if self.last_epoch.is_some_and(|last| last != epoch) {
            debug!("speech since last window, discarding partial utterance");
            self.recognizer.discard_utterance();
        }
        self.last_epoch = Some(epoch);
        self.recognizer.reset();

        let started = Instant::now();
        let mut transcript = None;

        while started.elapsed() < self.timeout && !self.stop.is_stopped() {
            let frame = self.microphone.read_frame()?;
            if let Some(text) = self.recognizer.accept_frame(&frame)? {
                transcript = Some(text);
                break;
            }
        }

        if self.gate.epoch() != epoch || self.gate.is_held() {
            debug!(?transcript, "discarding transcript that overlapped speech");
            return Ok(RecognitionResult::empty());
        }

        let result = transcript.map(RecognitionResult::new).unwrap_or_default();
        debug!(
            transcript = result.text(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "listening attempt finished"
        );
        Ok(result)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedRecognizer, SilentMicrophone};
    use super::*;

    fn listener(recognizer: impl Recognizer + 'static, gate: Arc<SpeechGate>) -> Listener {
        Listener::new(
            Box::new(SilentMicrophone),
            Box::new(recognizer),
            gate,
            StopToken::new(),
            Duration::from_millis(30),
        )
    }

    /// Recognizer that "speaks" over its own window before answering
    struct OverlappingRecognizer {
        gate: Arc<SpeechGate>,
    }

    impl Recognizer for OverlappingRecognizer {
        fn accept_frame(&mut self, _frame: &[i16]) -> Result<Option<String>, ListenError> {
            drop(self.gate.acquire());
            Ok(Some("hey sonny".to_string()))
        }
    }

    #[test]
    fn test_transcript_returned() {
        let mut listener = listener(ScriptedRecognizer::new(&["what time is it"]), Arc::default());
        assert_eq!(listener.listen().unwrap().text(), "what time is it");
    }

    #[test]
    fn test_silence_times_out_empty() {
        let mut listener = listener(ScriptedRecognizer::new(&[""]), Arc::default());
        let started = Instant::now();
        assert!(listener.listen().unwrap().is_empty());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_overlapping_speech_discards_result() {
        let gate = Arc::new(SpeechGate::new());
        let mut listener = listener(
            OverlappingRecognizer {
                gate: Arc::clone(&gate),
            },
            Arc::clone(&gate),
        );
        assert!(listener.listen().unwrap().is_empty());
    }

    #[test]
    fn test_stopped_listener_returns_empty() {
        let stop = StopToken::new();
        stop.stop();
        let mut listener = Listener::new(
            Box::new(SilentMicrophone),
            Box::new(ScriptedRecognizer::new(&["hello"])),
            Arc::default(),
            stop,
            Duration::from_secs(5),
        );
        assert!(listener.listen().unwrap().is_empty());
    }

    /// Counts how often the unfinished utterance was thrown away
    #[derive(Default)]
    struct CountingRecognizer {
        discarded: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Recognizer for CountingRecognizer {
        fn discard_utterance(&mut self) {
            self.discarded.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }

        fn accept_frame(&mut self, _frame: &[i16]) -> Result<Option<String>, ListenError> {
            Ok(None)
        }
    }

    #[test]
    fn test_speech_between_windows_discards_partial_utterance() {
        let gate = Arc::new(SpeechGate::new());
        let recognizer = CountingRecognizer::default();
        let discarded = Arc::clone(&recognizer.discarded);
        let mut listener = listener(recognizer, Arc::clone(&gate));

        listener.listen().unwrap();
        listener.listen().unwrap();
        assert_eq!(discarded.load(std::sync::atomic::Ordering::SeqCst), 0);

        drop(gate.acquire());
        listener.listen().unwrap();
        assert_eq!(discarded.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recognition_result_trims() {
        assert_eq!(RecognitionResult::new("  hello \n").text(), "hello");
        assert!(RecognitionResult::new("   ").is_empty());
    }
}
