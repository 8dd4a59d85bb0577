//! Perception Layer for the Exam Proctor
//!
//! Wraps the camera and the face-landmark model behind small ports:
//! - Learner-facing webcam (640x480 @ up to 30fps)
//! - Landmark model producing nose position and blendshape scores
//! - Per-frame `Detection` consumed by the suspicion engine
//!
//! The landmark model itself is opaque; anything implementing
//! [`LandmarkModel`] can be plugged in.

pub mod adapter;
pub mod camera;
pub mod detection;
pub mod frame;

pub use adapter::{from_fn, LandmarkModel, PerceptionAdapter, ReplayModel};
pub use camera::{Camera, CameraConfig, SyntheticCamera};
pub use detection::{Blendshape, Detection, FaceLandmarks, Landmark};
pub use frame::VideoFrame;

use thiserror::Error;

/// Camera error types
///
/// Each variant maps to a distinct, user-legible environment error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera found")]
    NotFound,

    #[error("Camera is in use by another application")]
    InUse,

    #[error("Camera access is not supported on this platform")]
    Unsupported,

    #[error("Video playback failed: {0}")]
    Playback(String),

    #[error("Camera failed to start within {0}ms")]
    Timeout(u64),

    #[error("Camera not initialized")]
    NotInitialized,
}

/// Perception error types
#[derive(Error, Debug)]
pub enum PerceptionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Landmark result is missing point {0}")]
    MissingLandmark(usize),

    #[error("Non-finite {0} in landmark result")]
    NonFinite(&'static str),

    #[error("Replay source error: {0}")]
    Replay(String),
}
