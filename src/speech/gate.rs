//! Mutual exclusion between speaking and listening
//!
//! Anything that produces audio holds the gate for the whole utterance.
//! The listening loop polls the gate and does not open a recognition window
//! while it is held, so the microphone never transcribes our own voice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::lifecycle::StopToken;

/// Poll granularity for the listening side
pub const GATE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Single-holder lock around audio output
#[derive(Debug, Default)]
pub struct SpeechGate {
    held: Mutex<bool>,
    released: Condvar,
    /// Incremented on every acquisition
    epoch: AtomicU64,
}

/// Proof of holding the gate; releases it exactly once on drop
#[derive(Debug)]
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct SpeechGuard<'a> {
    gate: &'a SpeechGate,
}

impl SpeechGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate is free, then take it
    pub fn acquire(&self) -> SpeechGuard<'_> {
        let mut held = self.lock();
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|p| p.into_inner());
        }
        self.take(held)
    }

    /// Take the gate only if nobody holds it
    #[cfg(test)]
    pub fn try_acquire(&self) -> Option<SpeechGuard<'_>> {
        let held = self.lock();
        if *held {
            return None;
        }
        Some(self.take(held))
    }

    pub fn is_held(&self) -> bool {
        *self.lock()
    }

    /// Number of acquisitions so far; a change means speech happened
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Poll every [`GATE_POLL_INTERVAL`] until the gate is free.
    ///
    /// Returns `false` if `stop` fired first.
    pub fn wait_until_released(&self, stop: &StopToken) -> bool {
        while self.is_held() {
            if stop.is_stopped() {
                return false;
            }
            trace!("speech in progress, holding off listening");
            thread::sleep(GATE_POLL_INTERVAL);
        }
        !stop.is_stopped()
    }

    fn take(&self, mut held: MutexGuard<'_, bool>) -> SpeechGuard<'_> {
        *held = true;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        SpeechGuard { gate: self }
    }

    fn release(&self) {
        *self.lock() = false;
        self.released.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for SpeechGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
