//! Suspicion Engine
//!
//! Turns a stream of per-frame detections into:
//! - At most one violation category per frame
//! - A heat level that rises on violations and cools on clean frames
//!
//! The engine holds only configuration; the mutable [`SuspicionState`] is
//! owned by the session and passed in by reference.

pub mod config;
pub mod state;
pub mod violation;

pub use config::SuspicionConfig;
pub use state::{MonitorMode, SuspicionState};
pub use violation::{Guidance, ViolationKind};

use perception::Detection;
use tracing::debug;

/// Classifier and heat accumulator
#[derive(Debug, Clone, Default)]
pub struct SuspicionEngine {
    config: SuspicionConfig,
}

impl SuspicionEngine {
    pub fn new(config: SuspicionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SuspicionConfig {
        &self.config
    }

    /// Fresh state for a new session
    pub fn initial_state(&self, mode: MonitorMode) -> SuspicionState {
        SuspicionState::new(self.config.max_level, mode)
    }

    /// Classify one frame.
    ///
    /// First match wins: no face, then horizontal pose, then (strict mode
    /// only) looking down and talking.
    pub fn classify(&self, detection: &Detection, mode: MonitorMode) -> Option<ViolationKind> {
        if !detection.present {
            return Some(ViolationKind::NoFace);
        }

        if detection.nose_x < self.config.head_left {
            return Some(ViolationKind::TurningLeft);
        }
        if detection.nose_x > self.config.head_right {
            return Some(ViolationKind::TurningRight);
        }

        if mode == MonitorMode::Strict {
            // Both eyes and head must be down; eyes alone is usually a blink
            if detection.eye_down_avg > self.config.eye_down_threshold
                && detection.nose_y > self.config.pitch_down_threshold
            {
                return Some(ViolationKind::LookingDown);
            }
            if detection.mouth_open > self.config.mouth_open {
                return Some(ViolationKind::Talking);
            }
        }

        None
    }

    /// Heat added by one frame of `kind`
    pub fn heat_for(&self, kind: ViolationKind) -> f32 {
        match kind {
            ViolationKind::NoFace => self.config.no_face_heat,
            _ => self.config.heat_rate,
        }
    }

    /// Fold one frame into the state: heat on a violation, cool otherwise.
    pub fn accumulate(&self, state: &mut SuspicionState, kind: Option<ViolationKind>) -> SuspicionState {
        match kind {
            Some(kind) => {
                state.level += self.heat_for(kind);
                debug!("Heat +{} ({}) -> {:.2}", self.heat_for(kind), kind, state.level);
            }
            None => {
                state.level = (state.level - self.config.cool_rate).max(0.0);
            }
        }
        *state
    }

    /// Reduced heat for a violation held back by an active warning or cooldown
    pub fn accumulate_suppressed(&self, state: &mut SuspicionState) -> SuspicionState {
        self.add_fraction(state, self.config.suppressed_heat_factor)
    }

    /// Penalty heat for an escalation that could not be backed by evidence
    pub fn accumulate_downgraded(&self, state: &mut SuspicionState) -> SuspicionState {
        self.add_fraction(state, self.config.downgraded_heat_factor)
    }

    /// Reward for correcting an active warning
    pub fn reward_correction(&self, state: &mut SuspicionState) -> SuspicionState {
        state.level = (state.level - self.config.correction_reward).max(0.0);
        *state
    }

    fn add_fraction(&self, state: &mut SuspicionState, factor: f32) -> SuspicionState {
        state.level += self.config.heat_rate * factor;
        *state
    }
}
