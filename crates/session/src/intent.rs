//! Presentation and side-effect intents emitted by the session core

use crate::error::EnvironmentError;
use serde::Serialize;
use suspicion::{Guidance, MonitorMode, ViolationKind};

/// Where the single video element is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VideoSlot {
    /// Large preview on the blocking shield
    Shield,
    /// Mini preview in the HUD
    Hud,
}

/// Something the adapter layer should render or perform
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Blocking error with a manual retry action
    ShowEnvironmentError(EnvironmentError),
    ScanStarted { duration_secs: u64 },
    ScanProgress { percent: u8, remaining_secs: u64 },
    ScanComplete,
    /// Shield prompt while waiting for a face
    Prompt(&'static str),
    /// Monitoring began; the session is now marked verified
    SessionStarted,
    ShowWarning {
        kind: ViolationKind,
        guidance: Guidance,
        grace_secs: u64,
    },
    UpdateCountdown { remaining_secs: u64 },
    DismissWarning { corrected: bool },
    /// Clamped suspicion level for the heat bar
    UpdateMeter { percent: f32 },
    /// Record an evidence clip (falls back to a still)
    CaptureClip { reason: String },
    CaptureStill { reason: String },
    StrikeRecorded { count: u32, reason: String },
    ShowLockdown {
        reason: String,
        remaining_strikes: u32,
        final_warning: bool,
    },
    Resume,
    ModeChanged(MonitorMode),
    MoveVideo(VideoSlot),
    /// Terminal, non-dismissable
    ShowBan { reason: String },
    StopMonitoring,
}

impl Intent {
    /// Whether this intent requests evidence capture
    pub fn is_capture(&self) -> bool {
        matches!(self, Intent::CaptureClip { .. } | Intent::CaptureStill { .. })
    }
}
