//! Evidence Module
//!
//! Proof for escalated violations:
//! - Cooldown gate deciding whether an escalation may be evidence-backed
//! - Still image and short clip capture from the shared video stream
//! - Fire-and-forget upload queue with a bounded retry backlog
//! - Best-effort session summary on shutdown

pub mod capture;
pub mod item;
pub mod tap;
pub mod uploader;

pub use capture::{EvidenceCapture, EvidenceCollector, EvidencePolicy, MediaSource, RecordedClip};
pub use item::{EvidenceItem, EvidenceKind};
pub use tap::FrameTap;
pub use uploader::{
    EvidenceEntry, HttpTransport, SessionSummary, Transport, UploadQueue, UploadRequest,
    UploadResponse, UploaderConfig,
};

use thiserror::Error;

/// Capture error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No frame available for snapshot")]
    NoFrame,

    #[error("Audio track unavailable")]
    AudioUnavailable,

    #[error("Recording failed: {0}")]
    Recording(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// Upload error types
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Upload queue closed")]
    QueueClosed,
}

impl UploadError {
    /// Whether the request may succeed if sent again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Transport(_) | UploadError::Status(_))
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => UploadError::Status(status.as_u16()),
            None => UploadError::Transport(err.to_string()),
        }
    }
}
