//! Process-wide mutable state owned by no single component
//!
//! Command handlers write these values; the speech actuator and the
//! tracking controller read them.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::hardware::{Channel, HardwareLink, PAN_CENTER, TILT_CENTER};

/// Which voice and lip-sync strategy subsequent speech uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageMode {
    /// Default language, phoneme-timed lip-sync
    #[default]
    Primary,
    /// Secondary language, amplitude-driven lip-sync
    Secondary,
}

impl LanguageMode {
    pub fn toggled(self) -> Self {
        match self {
            LanguageMode::Primary => LanguageMode::Secondary,
            LanguageMode::Secondary => LanguageMode::Primary,
        }
    }
}

impl fmt::Display for LanguageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageMode::Primary => write!(f, "primary"),
            LanguageMode::Secondary => write!(f, "secondary"),
        }
    }
}

/// Current pan/tilt angles of the head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadPose {
    pub pan: i32,
    pub tilt: i32,
}

impl Default for HeadPose {
    fn default() -> Self {
        Self {
            pan: PAN_CENTER,
            tilt: TILT_CENTER,
        }
    }
}

/// Flags and angles shared between the dialogue and tracking threads
#[derive(Debug)]
pub struct SharedState {
    language: Mutex<LanguageMode>,
    tracking_enabled: AtomicBool,
    voice_index: AtomicUsize,
    pose: Mutex<HeadPose>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            language: Mutex::new(LanguageMode::Primary),
            tracking_enabled: AtomicBool::new(true),
            voice_index: AtomicUsize::new(0),
            pose: Mutex::new(HeadPose::default()),
        }
    }

    pub fn language(&self) -> LanguageMode {
        *self.language.lock().unwrap_or_else(|p| p.into_inner())
    }

    #[cfg(test)]
    pub fn set_language(&self, mode: LanguageMode) {
        *self.language.lock().unwrap_or_else(|p| p.into_inner()) = mode;
    }

    /// Flip between primary and secondary, returning the new mode
    pub fn toggle_language(&self) -> LanguageMode {
        let mut language = self.language.lock().unwrap_or_else(|p| p.into_inner());
        *language = language.toggled();
        *language
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled.load(Ordering::SeqCst)
    }

    pub fn set_tracking_enabled(&self, enabled: bool) {
        self.tracking_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn voice_index(&self) -> usize {
        self.voice_index.load(Ordering::SeqCst)
    }

    /// Step to the next of `voice_count` voices, wrapping around
    pub fn advance_voice(&self, voice_count: usize) -> usize {
        if voice_count == 0 {
            return 0;
        }
        let next = (self.voice_index() + 1) % voice_count;
        self.voice_index.store(next, Ordering::SeqCst);
        next
    }

    #[cfg(test)]
    pub fn pose(&self) -> HeadPose {
        *self.lock_pose()
    }

    /// Read-modify-write the head pose and push it to the servos.
    ///
    /// The pose lock is held across the serial writes so a recentre from a
    /// command handler cannot interleave with a tracking correction.
    pub fn move_head(&self, link: &HardwareLink, update: impl FnOnce(&mut HeadPose)) -> HeadPose {
        let mut pose = self.lock_pose();
        let before = *pose;

        update(&mut pose);
        pose.pan = Channel::Pan.clamp(pose.pan);
        pose.tilt = Channel::Tilt.clamp(pose.tilt);

        if pose.pan != before.pan {
            link.send(Channel::Pan, pose.pan);
        }
        if pose.tilt != before.tilt {
            link.send(Channel::Tilt, pose.tilt);
        }

        *pose
    }

    /// Point the head straight ahead, always writing both axes
    pub fn center_head(&self, link: &HardwareLink) -> HeadPose {
        let mut pose = self.lock_pose();
        *pose = HeadPose::default();
        link.send(Channel::Pan, pose.pan);
        link.send(Channel::Tilt, pose.tilt);
        *pose
    }

    fn lock_pose(&self) -> MutexGuard<'_, HeadPose> {
        self.pose.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::hardware::testing::RecordingPort;

    #[test]
    fn test_toggle_language() {
        let shared = SharedState::new();
        assert_eq!(shared.language(), LanguageMode::Primary);
        assert_eq!(shared.toggle_language(), LanguageMode::Secondary);
        assert_eq!(shared.toggle_language(), LanguageMode::Primary);
    }

    #[test]
    fn test_advance_voice_wraps() {
        let shared = SharedState::new();
        assert_eq!(shared.advance_voice(3), 1);
        assert_eq!(shared.advance_voice(3), 2);
        assert_eq!(shared.advance_voice(3), 0);
        assert_eq!(shared.advance_voice(0), 0);
    }

    #[test]
    fn test_move_head_clamps_and_sends_changes() {
        let port = RecordingPort::default();
        let link = HardwareLink::from_writer(port.clone(), "test");
        let shared = SharedState::new();

        let pose = shared.move_head(&link, |pose| {
            pose.pan += 100;
            pose.tilt -= 100;
        });

        assert_eq!(pose, HeadPose { pan: 120, tilt: 70 });
        assert_eq!(port.frames(), vec!["pan:120", "tilt:70"]);
    }

    #[test]
    fn test_move_head_without_change_sends_nothing() {
        let port = RecordingPort::default();
        let link = HardwareLink::from_writer(port.clone(), "test");
        let shared = SharedState::new();

        shared.move_head(&link, |_| {});
        assert!(port.frames().is_empty());
    }

    #[test]
    fn test_concurrent_head_moves_stay_consistent() {
        let link = Arc::new(HardwareLink::disconnected());
        let shared = Arc::new(SharedState::new());

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let link = Arc::clone(&link);
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..200 {
                        if i % 2 == 0 {
                            shared.move_head(&link, |pose| pose.pan += 2);
                        } else {
                            shared.center_head(&link);
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let pose = shared.pose();
        assert!((60..=120).contains(&pose.pan));
        assert_eq!(pose.tilt, TILT_CENTER);
    }
}
