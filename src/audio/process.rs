//! Microphone and recognizer backed by external processes
//!
//! The microphone command writes raw 16-bit little-endian mono PCM to
//! stdout. The recognizer command reads the same format on stdin and prints
//! one JSON object per line; lines carrying a non-empty `"text"` field are
//! final transcripts, anything else (partials, diagnostics) is ignored.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::dialogue::{ListenError, Microphone, Recognizer, FRAME_SAMPLES};

/// Frames buffered between the capture process and the listener
const CAPTURE_QUEUE: usize = 8;

/// Longest wait for one frame before the microphone counts as stalled
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Environment variable carrying the JSON vocabulary to the recognizer
pub const VOCABULARY_ENV: &str = "SONNY_VOCABULARY";

fn spawn(argv: &[String], stdin: Stdio) -> Result<Child, ListenError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ListenError::Microphone("empty command".to_string()))?;

    Command::new(program)
        .args(args)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(ListenError::from)
}

fn terminate(child: &mut Child, what: &str) {
    if let Ok(None) = child.try_wait() {
        debug!(pid = child.id(), what, "terminating audio process");
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Little-endian 16-bit PCM to samples; a trailing odd byte is dropped
pub fn decode_frame(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub fn encode_frame(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Captures audio from a recording command such as `arecord`
pub struct ProcessMicrophone {
    child: Child,
    frames: Receiver<Vec<i16>>,
}

impl ProcessMicrophone {
    pub fn spawn(argv: &[String]) -> Result<Self, ListenError> {
        let mut child = spawn(argv, Stdio::null())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ListenError::Microphone("capture process has no stdout".to_string()))?;

        let (tx, frames) = mpsc::sync_channel(CAPTURE_QUEUE);
        thread::Builder::new()
            .name("microphone".to_string())
            .spawn(move || capture_loop(stdout, tx))?;

        info!(command = ?argv, "microphone started");
        Ok(Self { child, frames })
    }
}

fn capture_loop(mut stdout: impl Read, tx: SyncSender<Vec<i16>>) {
    let mut buf = vec![0u8; FRAME_SAMPLES * 2];
    loop {
        match stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) => {
                debug!(error = %e, "capture stream ended");
                return;
            }
        }

        match tx.try_send(decode_frame(&buf)) {
            Ok(()) => {}
            // Nobody is listening right now; stale audio is worthless
            Err(TrySendError::Full(_)) => trace!("capture queue full, dropping frame"),
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
}

impl Microphone for ProcessMicrophone {
    fn read_frame(&mut self) -> Result<Vec<i16>, ListenError> {
        match self.frames.recv_timeout(FRAME_TIMEOUT) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => {
                Err(ListenError::Microphone("no audio from capture process".to_string()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ListenError::Microphone("capture process exited".to_string()))
            }
        }
    }

    fn discard_pending(&mut self) {
        let mut dropped = 0;
        while self.frames.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            trace!(dropped, "discarded buffered audio");
        }
    }
}

impl Drop for ProcessMicrophone {
    fn drop(&mut self) {
        terminate(&mut self.child, "microphone");
    }
}

#[derive(Debug, Deserialize)]
struct RecognizerLine {
    #[serde(default)]
    text: Option<String>,
}

/// Final transcript carried by one line of recognizer output
pub fn parse_transcript(line: &str) -> Option<String> {
    let parsed: RecognizerLine = serde_json::from_str(line.trim()).ok()?;
    parsed
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

struct RunningRecognizer {
    child: Child,
    stdin: ChildStdin,
    transcripts: Receiver<String>,
}

/// Streams audio into a speech-to-text command
///
/// The process is started lazily. It is restarted when the vocabulary
/// changes, since the vocabulary is only handed over at startup, and when
/// an unfinished utterance must be forgotten, since raw PCM on stdin leaves
/// no room for an in-band reset.
pub struct ProcessRecognizer {
    argv: Vec<String>,
    vocabulary: Vec<String>,
    running: Option<RunningRecognizer>,
}

impl ProcessRecognizer {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            vocabulary: Vec::new(),
            running: None,
        }
    }

    fn ensure_running(&mut self) -> Result<&mut RunningRecognizer, ListenError> {
        if self.running.is_none() {
            self.running = Some(self.start()?);
        }
        self.running
            .as_mut()
            .ok_or_else(|| ListenError::Recognizer("recognizer not running".to_string()))
    }

    fn start(&self) -> Result<RunningRecognizer, ListenError> {
        let vocabulary = serde_json::to_string(&self.vocabulary)
            .map_err(|e| ListenError::Recognizer(e.to_string()))?;

        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| ListenError::Recognizer("no recognizer command configured".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .env(VOCABULARY_ENV, vocabulary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                terminate(&mut child, "recognizer");
                return Err(ListenError::Recognizer("recognizer pipes unavailable".to_string()));
            }
        };

        let (tx, transcripts) = mpsc::channel();
        thread::Builder::new()
            .name("recognizer-output".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if let Some(text) = parse_transcript(&line) {
                        if tx.send(text).is_err() {
                            break;
                        }
                    }
                }
                debug!("recognizer output closed");
            })?;

        info!(command = ?self.argv, phrases = self.vocabulary.len(), "recognizer started");
        Ok(RunningRecognizer {
            child,
            stdin,
            transcripts,
        })
    }

    fn shutdown(&mut self) {
        if let Some(mut running) = self.running.take() {
            drop(running.stdin);
            terminate(&mut running.child, "recognizer");
        }
    }
}

impl Recognizer for ProcessRecognizer {
    fn set_vocabulary(&mut self, phrases: &[String]) {
        if self.vocabulary != phrases {
            self.vocabulary = phrases.to_vec();
            self.shutdown();
        }
    }

    fn reset(&mut self) {
        if let Some(running) = &self.running {
            while running.transcripts.try_recv().is_ok() {}
        }
    }

    fn discard_utterance(&mut self) {
        if self.running.is_some() {
            debug!("restarting recognizer to drop buffered audio");
            self.shutdown();
        }
    }

    fn accept_frame(&mut self, frame: &[i16]) -> Result<Option<String>, ListenError> {
        let running = self.ensure_running()?;

        if let Err(e) = running.stdin.write_all(&encode_frame(frame)) {
            warn!(error = %e, "recognizer stopped accepting audio");
            self.shutdown();
            return Err(ListenError::Recognizer(e.to_string()));
        }

        match running.transcripts.try_recv() {
            Ok(text) => Ok(Some(text)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.shutdown();
                Err(ListenError::Recognizer("recognizer exited".to_string()))
            }
        }
    }
}

impl Drop for ProcessRecognizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
