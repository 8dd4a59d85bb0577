//! Suspicion engine configuration

use serde::{Deserialize, Serialize};

/// Classification thresholds and heat rates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspicionConfig {
    /// Nose X below this is turning left
    pub head_left: f32,

    /// Nose X above this is turning right
    pub head_right: f32,

    /// Mean eye-look-down score required for looking down
    pub eye_down_threshold: f32,

    /// Nose Y required (together with eyes) for looking down
    pub pitch_down_threshold: f32,

    /// Mouth-open score above which the learner is talking
    pub mouth_open: f32,

    /// Heat added per violating frame
    pub heat_rate: f32,

    /// Heat added per frame without a face
    pub no_face_heat: f32,

    /// Heat removed per clean frame
    pub cool_rate: f32,

    /// Level at which lockdown triggers
    pub max_level: f32,

    /// Fraction of `heat_rate` for frames suppressed by an active warning or cooldown
    pub suppressed_heat_factor: f32,

    /// Fraction of `heat_rate` for an escalation without evidence
    pub downgraded_heat_factor: f32,

    /// Level removed when the learner corrects an active warning
    pub correction_reward: f32,
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self {
            head_left: 0.40,
            head_right: 0.60,
            eye_down_threshold: 0.40,
            pitch_down_threshold: 0.55,
            mouth_open: 0.05,
            heat_rate: 2.0,
            no_face_heat: 3.0,
            cool_rate: 0.05,
            max_level: 10.0,
            suppressed_heat_factor: 0.3,
            downgraded_heat_factor: 0.5,
            correction_reward: 2.0,
        }
    }
}

impl SuspicionConfig {
    /// Narrower head window for high-stakes exams
    pub fn strict() -> Self {
        Self {
            head_left: 0.43,
            head_right: 0.57,
            ..Default::default()
        }
    }

    /// Wider head window for accessibility accommodations
    pub fn lenient() -> Self {
        Self {
            head_left: 0.35,
            head_right: 0.65,
            no_face_heat: 2.0,
            ..Default::default()
        }
    }
}
