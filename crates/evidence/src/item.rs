//! Evidence items

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evidence media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Image,
    Video,
}

/// Captured proof, held until handed to the upload queue
#[derive(Debug, Clone)]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    pub payload: Vec<u8>,
    pub mime: String,
    pub reason_label: String,
    pub captured_at: DateTime<Utc>,
    pub duration_sec: Option<u32>,
}

impl EvidenceItem {
    /// JPEG still
    pub fn image(jpeg: Vec<u8>, reason: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            kind: EvidenceKind::Image,
            payload: jpeg,
            mime: "image/jpeg".to_string(),
            reason_label: reason.into(),
            captured_at,
            duration_sec: None,
        }
    }

    /// Recorded clip
    pub fn video(
        bytes: Vec<u8>,
        mime: impl Into<String>,
        reason: impl Into<String>,
        duration_sec: u32,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EvidenceKind::Video,
            payload: bytes,
            mime: mime.into(),
            reason_label: reason.into(),
            captured_at,
            duration_sec: Some(duration_sec),
        }
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.payload))
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}
