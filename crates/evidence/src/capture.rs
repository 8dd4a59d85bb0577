//! Evidence capture

use crate::item::EvidenceItem;
use crate::uploader::UploadQueue;
use crate::CaptureError;
use async_trait::async_trait;
use chrono::Utc;
use perception::VideoFrame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Evidence policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidencePolicy {
    /// Minimum time between two evidence-backed escalations (milliseconds)
    pub upload_cooldown_ms: u64,
    /// Clip length for escalations
    pub clip_duration_sec: u32,
    /// Try to include the microphone in clips
    pub clip_audio: bool,
    pub still_width: u32,
    pub still_height: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self {
            upload_cooldown_ms: 30_000,
            clip_duration_sec: 5,
            clip_audio: true,
            still_width: 320,
            still_height: 240,
            jpeg_quality: 50,
        }
    }
}

/// Evidence upload cooldown gate
#[derive(Debug, Clone, Default)]
pub struct EvidenceCapture {
    cooldown_ms: u64,
    last_capture_at_ms: Option<u64>,
}

impl EvidenceCapture {
    pub fn new(policy: &EvidencePolicy) -> Self {
        Self {
            cooldown_ms: policy.upload_cooldown_ms,
            last_capture_at_ms: None,
        }
    }

    /// Whether an escalation at `now_ms` may be evidence-backed
    pub fn ready(&self, now_ms: u64) -> bool {
        match self.last_capture_at_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.cooldown_ms,
            None => true,
        }
    }

    /// Claim the gate: returns false (and changes nothing) while cooling down
    pub fn try_begin(&mut self, now_ms: u64) -> bool {
        if !self.ready(now_ms) {
            debug!("Evidence capture suppressed: cooldown active");
            return false;
        }
        self.last_capture_at_ms = Some(now_ms);
        true
    }

    pub fn last_capture_at_ms(&self) -> Option<u64> {
        self.last_capture_at_ms
    }
}

/// Recorded clip bytes
#[derive(Debug, Clone)]
pub struct RecordedClip {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Access to the shared video stream for evidence
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Latest frame
    async fn snapshot(&self) -> Result<VideoFrame, CaptureError>;

    /// Record a clip; runs for `duration` without blocking the sampling loop
    async fn record_clip(&self, duration: Duration, with_audio: bool) -> Result<RecordedClip, CaptureError>;
}

/// Turns capture requests into uploaded evidence in the background
#[derive(Clone)]
pub struct EvidenceCollector {
    source: Arc<dyn MediaSource>,
    policy: EvidencePolicy,
    queue: UploadQueue,
}

impl EvidenceCollector {
    pub fn new(source: Arc<dyn MediaSource>, policy: EvidencePolicy, queue: UploadQueue) -> Self {
        Self { source, policy, queue }
    }

    /// Capture a still and enqueue it
    pub fn spawn_still(&self, reason: String) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.still(&reason).await {
                Ok(item) => this.queue.enqueue(item),
                Err(e) => warn!("Still capture failed for '{}': {}", reason, e),
            }
        })
    }

    /// Record a clip (falling back to a still) and enqueue it
    pub fn spawn_clip(&self, reason: String) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.clip_or_still(&reason).await {
                Ok(item) => this.queue.enqueue(item),
                Err(e) => warn!("Evidence lost for '{}': {}", reason, e),
            }
        })
    }

    /// 320x240 JPEG of the latest frame
    pub async fn still(&self, reason: &str) -> Result<EvidenceItem, CaptureError> {
        let frame = self.source.snapshot().await?;
        let small = frame.resize(self.policy.still_width, self.policy.still_height);
        let jpeg = small
            .to_jpeg(self.policy.jpeg_quality)
            .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        debug!("Captured still ({} bytes): {}", jpeg.len(), reason);
        Ok(EvidenceItem::image(jpeg, reason, Utc::now()))
    }

    /// Clip with audio, then video only, then a single still
    pub async fn clip_or_still(&self, reason: &str) -> Result<EvidenceItem, CaptureError> {
        let duration = Duration::from_secs(self.policy.clip_duration_sec as u64);

        if self.policy.clip_audio {
            match self.source.record_clip(duration, true).await {
                Ok(clip) => return Ok(self.clip_item(clip, reason, true)),
                Err(CaptureError::AudioUnavailable) => debug!("Audio unavailable, recording video only"),
                Err(e) => {
                    warn!("Clip recording failed, falling back to still: {}", e);
                    return self.still(reason).await;
                }
            }
        }

        match self.source.record_clip(duration, false).await {
            Ok(clip) => Ok(self.clip_item(clip, reason, false)),
            Err(e) => {
                warn!("Clip recording failed, falling back to still: {}", e);
                self.still(reason).await
            }
        }
    }

    fn clip_item(&self, clip: RecordedClip, reason: &str, with_audio: bool) -> EvidenceItem {
        let label = format!(
            "{} [{}]",
            reason,
            if with_audio { "VIDEO+AUDIO" } else { "VIDEO" }
        );
        info!("Recorded {}s clip ({} bytes): {}", self.policy.clip_duration_sec, clip.bytes.len(), label);
        EvidenceItem::video(clip.bytes, clip.mime, label, self.policy.clip_duration_sec, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::EvidenceKind;
    use crate::uploader::UploaderConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeSource {
        audio: bool,
        video: bool,
        clip_calls: AtomicU32,
    }

    impl FakeSource {
        fn new(audio: bool, video: bool) -> Self {
            Self { audio, video, clip_calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl MediaSource for FakeSource {
        async fn snapshot(&self) -> Result<VideoFrame, CaptureError> {
            Ok(VideoFrame::filled(640, 480, [40, 40, 40], 0, 0))
        }

        async fn record_clip(&self, _duration: Duration, with_audio: bool) -> Result<RecordedClip, CaptureError> {
            self.clip_calls.fetch_add(1, Ordering::SeqCst);
            if with_audio && !self.audio {
                return Err(CaptureError::AudioUnavailable);
            }
            if !self.video {
                return Err(CaptureError::Recording("encoder missing".to_string()));
            }
            Ok(RecordedClip { bytes: vec![7; 16], mime: "video/webm".to_string() })
        }
    }

    fn collector(source: FakeSource) -> (Arc<FakeSource>, EvidenceCollector) {
        let source = Arc::new(source);
        let (queue, _rx) = UploadQueue::detached(&UploaderConfig::default());
        let collector = EvidenceCollector::new(source.clone(), EvidencePolicy::default(), queue);
        (source, collector)
    }

    #[test]
    fn test_cooldown_gate() {
        let mut gate = EvidenceCapture::new(&EvidencePolicy::default());
        assert!(gate.try_begin(0));
        assert!(!gate.try_begin(10_000));
        assert_eq!(gate.last_capture_at_ms(), Some(0));
        assert!(gate.try_begin(31_000));
        assert_eq!(gate.last_capture_at_ms(), Some(31_000));
    }

    #[tokio::test]
    async fn test_still_is_small_jpeg() {
        let (_, collector) = collector(FakeSource::new(true, true));
        let item = collector.still("No Face").await.unwrap();
        assert_eq!(item.kind, EvidenceKind::Image);
        assert_eq!(item.mime, "image/jpeg");
        assert_eq!(&item.payload[..2], &[0xff, 0xd8]);
    }

    #[tokio::test]
    async fn test_clip_with_audio() {
        let (_, collector) = collector(FakeSource::new(true, true));
        let item = collector.clip_or_still("Talking").await.unwrap();
        assert_eq!(item.kind, EvidenceKind::Video);
        assert_eq!(item.reason_label, "Talking [VIDEO+AUDIO]");
        assert_eq!(item.duration_sec, Some(5));
    }

    #[tokio::test]
    async fn test_clip_without_audio() {
        let (source, collector) = collector(FakeSource::new(false, true));
        let item = collector.clip_or_still("Turning Left").await.unwrap();
        assert_eq!(item.reason_label, "Turning Left [VIDEO]");
        assert_eq!(source.clip_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_recording_failure_falls_back_to_still() {
        let (_, collector) = collector(FakeSource::new(false, false));
        let item = collector.clip_or_still("Turning Right").await.unwrap();
        assert_eq!(item.kind, EvidenceKind::Image);
        assert_eq!(item.reason_label, "Turning Right");
    }
}
