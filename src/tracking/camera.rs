//! Camera and face detector seams

/// Errors from the vision side of tracking
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

/// One captured image; only the dimensions matter to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed pixel data in whatever layout the detector expects
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn center(&self) -> (i32, i32) {
        (self.width as i32 / 2, self.height as i32 / 2)
    }
}

/// Axis-aligned face box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }
}

pub trait Camera: Send {
    /// Grab the next frame; `Ok(None)` when no frame is ready yet
    fn capture(&mut self) -> Result<Option<Frame>, VisionError>;
}

pub trait FaceDetector: Send {
    /// Faces in detector order; the first one is tracked
    fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox>;
}

/// Stand-in when no camera is attached
#[derive(Debug, Default)]
pub struct UnavailableCamera;

impl Camera for UnavailableCamera {
    fn capture(&mut self) -> Result<Option<Frame>, VisionError> {
        Err(VisionError::Unavailable("no camera configured".to_string()))
    }
}

/// Detector that never finds anything
#[derive(Debug, Default)]
pub struct NoFaceDetector;

impl FaceDetector for NoFaceDetector {
    fn detect(&mut self, _frame: &Frame) -> Vec<BoundingBox> {
        Vec::new()
    }
}
