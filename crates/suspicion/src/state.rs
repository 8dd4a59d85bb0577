//! Suspicion state tracking

use serde::{Deserialize, Serialize};

/// Monitoring sensitivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonitorMode {
    #[default]
    Normal,
    /// Looking-down and talking checks enabled
    Strict,
}

/// Continuously-valued suspicion for one session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspicionState {
    /// Accumulated heat, never negative. May exceed `max_level` momentarily.
    pub level: f32,

    /// Level at which lockdown triggers
    pub max_level: f32,

    /// Current sensitivity
    pub mode: MonitorMode,
}

impl SuspicionState {
    pub fn new(max_level: f32, mode: MonitorMode) -> Self {
        Self {
            level: 0.0,
            max_level,
            mode,
        }
    }

    /// Level clamped to `[0, max_level]` for display
    pub fn display_level(&self) -> f32 {
        self.level.clamp(0.0, self.max_level)
    }

    /// Display level as a percentage of `max_level`
    pub fn percent(&self) -> f32 {
        if self.max_level <= 0.0 {
            return 0.0;
        }
        self.display_level() / self.max_level * 100.0
    }

    /// Whether lockdown should trigger
    pub fn is_saturated(&self) -> bool {
        self.level >= self.max_level
    }

    pub fn is_strict(&self) -> bool {
        self.mode == MonitorMode::Strict
    }

    /// Reset heat (after a confirmed strike or resume)
    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}
