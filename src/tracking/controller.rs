//! Closed-loop face tracking
//!
//! Runs on its own thread at a fixed cadence, independent of the dialogue.
//! Each tick nudges the head a fixed step towards the first detected face
//! unless the face is already inside the deadband.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::hardware::HardwareLink;
use crate::lifecycle::StopToken;
use crate::state::{HeadPose, SharedState};

use super::camera::{Camera, FaceDetector, VisionError};

/// Pixels of offset tolerated on each axis before the head moves
pub const DEADBAND: i32 = 40;

/// Degrees moved per tick on each axis
pub const STEP: i32 = 2;

/// Sleep between ticks (~20 Hz)
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("failed to spawn tracking thread: {0}")]
    ThreadSpawn(String),
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Tracking disabled or no serial link
    Inactive,
    /// No frame ready or the camera failed
    NoFrame,
    NoFace,
    /// A face was found; the pose after correction
    Tracked(HeadPose),
}

pub struct TrackingController {
    shared: Arc<SharedState>,
    link: Arc<HardwareLink>,
    camera: Box<dyn Camera>,
    detector: Box<dyn FaceDetector>,
    /// Whether a camera failure has already been reported
    camera_degraded: bool,
}

impl TrackingController {
    pub fn new(
        shared: Arc<SharedState>,
        link: Arc<HardwareLink>,
        camera: Box<dyn Camera>,
        detector: Box<dyn FaceDetector>,
    ) -> Self {
        Self {
            shared,
            link,
            camera,
            detector,
            camera_degraded: false,
        }
    }

    /// Run the loop on a dedicated thread until `stop` fires
    pub fn start(mut self, stop: StopToken) -> Result<JoinHandle<()>, TrackingError> {
        thread::Builder::new()
            .name("face-tracking".to_string())
            .spawn(move || {
                info!("face tracking thread started");
                while !stop.is_stopped() {
                    self.tick();
                    if !stop.sleep(TICK_INTERVAL) {
                        break;
                    }
                }
                info!("face tracking thread stopped");
            })
            .map_err(|e| TrackingError::ThreadSpawn(e.to_string()))
    }

    /// One capture, detect and correct cycle
    pub fn tick(&mut self) -> Tick {
        if !self.shared.tracking_enabled() || !self.link.is_connected() {
            return Tick::Inactive;
        }

        let frame = match self.camera.capture() {
            Ok(Some(frame)) => {
                if self.camera_degraded {
                    info!("camera recovered");
                    self.camera_degraded = false;
                }
                frame
            }
            Ok(None) => return Tick::NoFrame,
            Err(e) => {
                self.report_camera_error(&e);
                return Tick::NoFrame;
            }
        };

        let faces = self.detector.detect(&frame);
        let Some(face) = faces.first() else {
            return Tick::NoFace;
        };

        let (face_x, face_y) = face.center();
        let (frame_x, frame_y) = frame.center();
        let (d_pan, d_tilt) = correction(face_x - frame_x, face_y - frame_y);

        let pose = self.shared.move_head(&self.link, |pose| {
            pose.pan += d_pan;
            pose.tilt += d_tilt;
        });
        if d_pan != 0 || d_tilt != 0 {
            debug!(pan = pose.pan, tilt = pose.tilt, faces = faces.len(), "tracking correction");
        }
        Tick::Tracked(pose)
    }

    fn report_camera_error(&mut self, error: &VisionError) {
        if self.camera_degraded {
            debug!(%error, "camera still unavailable");
        } else {
            warn!(%error, "face tracking degraded, continuing without camera");
            self.camera_degraded = true;
        }
    }
}

/// Pan/tilt step for a face offset from the frame center.
///
/// Image x grows to the right while pan grows to the left; image y grows
/// downward and so does tilt.
pub fn correction(offset_x: i32, offset_y: i32) -> (i32, i32) {
    let pan = if offset_x > DEADBAND {
        -STEP
    } else if offset_x < -DEADBAND {
        STEP
    } else {
        0
    };

    let tilt = if offset_y > DEADBAND {
        STEP
    } else if offset_y < -DEADBAND {
        -STEP
    } else {
        0
    };

    (pan, tilt)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::hardware::testing::RecordingPort;
    use crate::tracking::camera::{BoundingBox, Frame, UnavailableCamera};

    /// Camera that always returns a 640x480 frame
    struct StillCamera;

    impl Camera for StillCamera {
        fn capture(&mut self) -> Result<Option<Frame>, VisionError> {
            Ok(Some(Frame::new(640, 480, Vec::new())))
        }
    }

    /// Detector that always reports the same boxes
    struct FixedDetector {
        faces: Vec<BoundingBox>,
        calls: Arc<AtomicUsize>,
    }

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Vec<BoundingBox> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.faces.clone()
        }
    }

    /// 40x40 box centered at (cx, cy)
    fn face_at(cx: i32, cy: i32) -> BoundingBox {
        BoundingBox {
            x: cx - 20,
            y: cy - 20,
            w: 40,
            h: 40,
        }
    }

    struct Rig {
        controller: TrackingController,
        shared: Arc<SharedState>,
        port: RecordingPort,
        calls: Arc<AtomicUsize>,
    }

    fn build_rig(faces: Vec<BoundingBox>) -> Rig {
        let port = RecordingPort::default();
        let link = Arc::new(HardwareLink::from_writer(port.clone(), "test"));
        let shared = Arc::new(SharedState::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = TrackingController::new(
            Arc::clone(&shared),
            link,
            Box::new(StillCamera),
            Box::new(FixedDetector {
                faces,
                calls: Arc::clone(&calls),
            }),
        );
        Rig {
            controller,
            shared,
            port,
            calls,
        }
    }

    #[test]
    fn test_correction_deadband() {
        assert_eq!(correction(0, 0), (0, 0));
        assert_eq!(correction(40, -40), (0, 0));
        assert_eq!(correction(41, 0), (-STEP, 0));
        assert_eq!(correction(-41, 0), (STEP, 0));
        assert_eq!(correction(0, 41), (0, STEP));
        assert_eq!(correction(0, -41), (0, -STEP));
    }

    #[test]
    fn test_centered_face_leaves_head_still() {
        let mut rig = build_rig(vec![face_at(320, 240)]);

        assert_eq!(rig.controller.tick(), Tick::Tracked(HeadPose::default()));
        assert!(rig.port.frames().is_empty());
    }

    #[test]
    fn test_offset_face_moves_head_towards_it() {
        let mut rig = build_rig(vec![face_at(500, 100)]);

        let Tick::Tracked(pose) = rig.controller.tick() else {
            panic!("expected a tracked face");
        };
        assert_eq!(pose, HeadPose { pan: 88, tilt: 88 });
        assert_eq!(rig.port.frames(), vec!["pan:88", "tilt:88"]);
    }

    #[test]
    fn test_only_first_face_is_followed() {
        let mut rig = build_rig(vec![face_at(100, 240), face_at(600, 240)]);
        rig.controller.tick();
        assert_eq!(rig.shared.pose().pan, 92);
    }

    #[test]
    fn test_angles_stay_in_range_after_many_ticks() {
        let mut rig = build_rig(vec![face_at(0, 479)]);
        for _ in 0..100 {
            rig.controller.tick();
        }
        assert_eq!(rig.shared.pose(), HeadPose { pan: 120, tilt: 110 });

        let mut rig = build_rig(vec![face_at(639, 0)]);
        for _ in 0..100 {
            rig.controller.tick();
        }
        assert_eq!(rig.shared.pose(), HeadPose { pan: 60, tilt: 70 });
    }

    #[test]
    fn test_disabled_tracking_is_noop() {
        let mut rig = build_rig(vec![face_at(600, 400)]);
        rig.shared.set_tracking_enabled(false);

        assert_eq!(rig.controller.tick(), Tick::Inactive);
        assert_eq!(rig.calls.load(Ordering::SeqCst), 0);
        assert!(rig.port.frames().is_empty());
    }

    #[test]
    fn test_missing_link_is_noop() {
        let shared = Arc::new(SharedState::new());
        let mut controller = TrackingController::new(
            Arc::clone(&shared),
            Arc::new(HardwareLink::disconnected()),
            Box::new(StillCamera),
            Box::new(FixedDetector {
                faces: vec![face_at(600, 400)],
                calls: Arc::default(),
            }),
        );

        assert_eq!(controller.tick(), Tick::Inactive);
        assert_eq!(shared.pose(), HeadPose::default());
    }

    #[test]
    fn test_no_face_means_no_change() {
        let mut rig = build_rig(Vec::new());
        assert_eq!(rig.controller.tick(), Tick::NoFace);
        assert_eq!(rig.shared.pose(), HeadPose::default());
    }

    #[test]
    fn test_unavailable_camera_reported_once() {
        let port = RecordingPort::default();
        let mut controller = TrackingController::new(
            Arc::new(SharedState::new()),
            Arc::new(HardwareLink::from_writer(port, "test")),
            Box::new(UnavailableCamera),
            Box::new(FixedDetector {
                faces: Vec::new(),
                calls: Arc::default(),
            }),
        );

        assert_eq!(controller.tick(), Tick::NoFrame);
        assert!(controller.camera_degraded);
        assert_eq!(controller.tick(), Tick::NoFrame);
    }

    #[test]
    fn test_thread_stops_on_token() {
        let rig = build_rig(vec![face_at(600, 240)]);
        let stop = StopToken::new();
        let handle = rig.controller.start(stop.clone()).unwrap();

        thread::sleep(Duration::from_millis(120));
        stop.stop();
        handle.join().unwrap();

        assert!(rig.calls.load(Ordering::SeqCst) >= 1);
        assert!(rig.shared.pose().pan < 90);
    }
}
