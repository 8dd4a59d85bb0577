//! Shared video stream tap

use crate::capture::{MediaSource, RecordedClip};
use crate::CaptureError;
use async_trait::async_trait;
use perception::VideoFrame;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

const MJPEG_BOUNDARY: &str = "frame";

/// Latest-frame slot shared by the sampling loop and evidence capture.
///
/// The loop publishes every grabbed frame; capture only reads, so the
/// stream is never opened twice.
#[derive(Clone)]
pub struct FrameTap {
    latest: Arc<RwLock<Option<VideoFrame>>>,
    clip_fps: u32,
    clip_quality: u8,
}

impl FrameTap {
    pub fn new(clip_fps: u32, clip_quality: u8) -> Self {
        Self {
            latest: Arc::new(RwLock::new(None)),
            clip_fps: clip_fps.max(1),
            clip_quality,
        }
    }

    /// Replace the latest frame
    pub fn publish(&self, frame: VideoFrame) {
        if let Ok(mut slot) = self.latest.write() {
            *slot = Some(frame);
        }
    }

    pub fn latest(&self) -> Option<VideoFrame> {
        self.latest.read().ok().and_then(|slot| slot.clone())
    }
}

impl Default for FrameTap {
    fn default() -> Self {
        Self::new(5, 50)
    }
}

#[async_trait]
impl MediaSource for FrameTap {
    async fn snapshot(&self) -> Result<VideoFrame, CaptureError> {
        self.latest().ok_or(CaptureError::NoFrame)
    }

    /// Motion-JPEG clip sampled from the published frames
    async fn record_clip(&self, duration: Duration, with_audio: bool) -> Result<RecordedClip, CaptureError> {
        if with_audio {
            return Err(CaptureError::AudioUnavailable);
        }

        let period = Duration::from_millis(1000 / self.clip_fps as u64);
        let frames_wanted = (duration.as_millis() / period.as_millis().max(1)).max(1) as usize;
        let mut ticker = tokio::time::interval(period);
        let mut bytes = Vec::new();
        let mut last_sequence = None;
        let mut recorded = 0usize;

        for _ in 0..frames_wanted {
            ticker.tick().await;
            let Some(frame) = self.latest() else { continue };
            if last_sequence == Some(frame.sequence) {
                continue;
            }
            last_sequence = Some(frame.sequence);

            let jpeg = frame
                .to_jpeg(self.clip_quality)
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;
            bytes.extend_from_slice(
                format!(
                    "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                    MJPEG_BOUNDARY,
                    jpeg.len()
                )
                .as_bytes(),
            );
            bytes.extend_from_slice(&jpeg);
            bytes.extend_from_slice(b"\r\n");
            recorded += 1;
        }

        if recorded == 0 {
            return Err(CaptureError::Recording("no frames published during clip".to_string()));
        }
        debug!("Recorded {} frames into clip", recorded);

        Ok(RecordedClip {
            bytes,
            mime: format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY),
        })
    }
}
