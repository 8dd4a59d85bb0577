//! Camera port and configuration

use crate::{CameraError, VideoFrame};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// Time allowed for the stream to deliver its first frame (milliseconds)
    pub start_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            start_timeout_ms: 15_000,
        }
    }
}

/// A single shared video stream.
///
/// The stream is opened once per session; live classification, the mini
/// preview and evidence capture all read from the same instance.
pub trait Camera: Send {
    /// Open the device and start streaming
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError>;

    /// Grab the latest frame
    fn grab(&mut self) -> Result<VideoFrame, CameraError>;

    /// Whether the stream is live
    fn is_streaming(&self) -> bool;

    /// Human-readable device label
    fn label(&self) -> String {
        "camera".to_string()
    }
}

/// Camera producing flat frames, for replay runs and tests
pub struct SyntheticCamera {
    config: Option<CameraConfig>,
    sequence: u32,
    clock: Box<dyn Fn() -> u64 + Send>,
}

impl SyntheticCamera {
    /// Create a synthetic camera stamping frames with the given clock
    pub fn new(clock: impl Fn() -> u64 + Send + 'static) -> Self {
        Self {
            config: None,
            sequence: 0,
            clock: Box::new(clock),
        }
    }
}

impl Camera for SyntheticCamera {
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        info!("Opening synthetic camera {}x{}", config.width, config.height);
        self.config = Some(config.clone());
        Ok(())
    }

    fn grab(&mut self) -> Result<VideoFrame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        self.sequence = self.sequence.wrapping_add(1);
        debug!("Synthetic frame {}", self.sequence);
        Ok(VideoFrame::filled(
            config.width,
            config.height,
            [96, 96, 96],
            (self.clock)(),
            self.sequence,
        ))
    }

    fn is_streaming(&self) -> bool {
        self.config.is_some()
    }

    fn label(&self) -> String {
        "synthetic".to_string()
    }
}
