//! Session error types

use perception::{CameraError, PerceptionError};
use strike_ledger::StoreError;
use thiserror::Error;

/// Environment and gate errors.
///
/// Terminal to the current attempt, recoverable by a manual retry. None of
/// these are retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvironmentError {
    #[error("BROWSER_NOT_SUPPORTED: camera access is not available")]
    BrowserNotSupported,

    #[error("Camera permission denied")]
    CameraPermissionDenied,

    #[error("No camera found")]
    CameraNotFound,

    #[error("Camera in use by another application")]
    CameraInUse,

    #[error("CAMERA_TIMEOUT: camera failed to start within {0}ms")]
    CameraTimeout(u64),

    #[error("VIDEO_PLAY_ERROR: {0}")]
    VideoPlayback(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Lockdown browser required: {0}")]
    InsecureEnvironment(String),

    #[error("SCAN_INCOMPLETE: environment scan reached {:.0}%", .progress * 100.0)]
    ScanIncomplete { progress: f32 },
}

impl EnvironmentError {
    /// Short user-facing title
    pub fn title(&self) -> &'static str {
        match self {
            EnvironmentError::BrowserNotSupported => "Incompatible Browser",
            EnvironmentError::CameraPermissionDenied => "Camera Permission Denied",
            EnvironmentError::CameraNotFound => "No Camera Found",
            EnvironmentError::CameraInUse | EnvironmentError::CameraTimeout(_) => "Camera In Use",
            EnvironmentError::VideoPlayback(_) => "Video Playback Error",
            EnvironmentError::ModelLoad(_) => "Initialization Failed",
            EnvironmentError::InsecureEnvironment(_) => "Lockdown Browser Required",
            EnvironmentError::ScanIncomplete { .. } => "Environment Scan Incomplete",
        }
    }

    /// What the learner should do before retrying
    pub fn remediation(&self) -> &'static str {
        match self {
            EnvironmentError::BrowserNotSupported => {
                "This browser doesn't support camera access. Please use Chrome, Firefox, or Microsoft Edge."
            }
            EnvironmentError::CameraPermissionDenied => {
                "You must allow camera access. Look for the camera icon in your browser's address bar and click Allow, then retry."
            }
            EnvironmentError::CameraNotFound => {
                "No camera detected on this device. Please connect a webcam and retry."
            }
            EnvironmentError::CameraInUse | EnvironmentError::CameraTimeout(_) => {
                "Camera is being used by another application (Zoom, Teams, Skype, etc.). Close other apps and retry."
            }
            EnvironmentError::VideoPlayback(_) => {
                "Failed to start video playback. This may be a browser security setting. Try refreshing the page."
            }
            EnvironmentError::ModelLoad(_) => {
                "The face detection engine could not be loaded. Check your connection and retry."
            }
            EnvironmentError::InsecureEnvironment(_) => {
                "This exam must be taken in a lockdown browser such as Safe Exam Browser. Contact your institution's IT department."
            }
            EnvironmentError::ScanIncomplete { .. } => {
                "Turn slowly to show your whole exam environment, keeping your face visible, then try again."
            }
        }
    }

    /// Whether a manual retry can succeed without outside help
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EnvironmentError::InsecureEnvironment(_))
    }
}

impl From<CameraError> for EnvironmentError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::PermissionDenied => EnvironmentError::CameraPermissionDenied,
            CameraError::NotFound => EnvironmentError::CameraNotFound,
            CameraError::InUse => EnvironmentError::CameraInUse,
            CameraError::Unsupported => EnvironmentError::BrowserNotSupported,
            CameraError::Playback(msg) => EnvironmentError::VideoPlayback(msg),
            CameraError::Timeout(ms) => EnvironmentError::CameraTimeout(ms),
            CameraError::NotInitialized => EnvironmentError::VideoPlayback("stream not started".to_string()),
        }
    }
}

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Perception error: {0}")]
    Perception(#[from] PerceptionError),

    #[error("Learner is banned: {0}")]
    Banned(String),

    #[error("Session runtime stopped")]
    Stopped,
}
