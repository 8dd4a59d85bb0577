//! Warning Controller Implementation

use serde::{Deserialize, Serialize};
use suspicion::ViolationKind;
use tracing::{debug, info};

/// Warning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningConfig {
    /// Minimum time between two warnings of any kind (milliseconds)
    pub cooldown_ms: u64,
    /// Time the learner has to correct a violation (milliseconds)
    pub grace_period_ms: u64,
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 15_000,
            grace_period_ms: 8_000,
        }
    }
}

/// The single warning slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarningState {
    /// Whether a warning is currently shown
    pub active: bool,
    /// Kind being warned about
    pub kind: Option<ViolationKind>,
    /// When the active warning was armed
    pub started_at_ms: u64,
    /// When any warning was last shown
    pub last_shown_at_ms: Option<u64>,
}

/// What a violating frame did to the warning slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningOutcome {
    /// A new warning was armed; show guidance for `grace_ms`
    Armed { kind: ViolationKind, grace_ms: u64 },
    /// The armed warning is counting down
    Pending { kind: ViolationKind, remaining_ms: u64 },
    /// The grace period ran out with the violation still present
    Escalated(ViolationKind),
    /// Held back by another active warning or the cooldown
    Suppressed,
}

/// Idle -> Armed(kind) -> {Resolved | Escalated} state machine
#[derive(Debug, Default)]
pub struct WarningController {
    config: WarningConfig,
    state: WarningState,
}

impl WarningController {
    /// Create a new warning controller
    pub fn new(config: WarningConfig) -> Self {
        info!("Creating warning controller with config: {:?}", config);
        Self {
            config,
            state: WarningState::default(),
        }
    }

    pub fn config(&self) -> &WarningConfig {
        &self.config
    }

    /// Current warning slot
    pub fn state(&self) -> &WarningState {
        &self.state
    }

    /// Whether a warning is shown
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Feed a violating frame
    pub fn observe(&mut self, kind: ViolationKind, now_ms: u64) -> WarningOutcome {
        if self.state.active {
            if self.state.kind != Some(kind) {
                // Only clearing the armed kind resolves it; other kinds wait
                return WarningOutcome::Suppressed;
            }

            let elapsed = now_ms.saturating_sub(self.state.started_at_ms);
            if elapsed >= self.config.grace_period_ms {
                info!("Warning escalated: {} after {}ms", kind, elapsed);
                self.clear();
                return WarningOutcome::Escalated(kind);
            }

            return WarningOutcome::Pending {
                kind,
                remaining_ms: self.config.grace_period_ms - elapsed,
            };
        }

        if !self.cooldown_elapsed(now_ms) {
            debug!("Warning suppressed: in cooldown period");
            return WarningOutcome::Suppressed;
        }

        self.state.active = true;
        self.state.kind = Some(kind);
        self.state.started_at_ms = now_ms;
        self.state.last_shown_at_ms = Some(now_ms);
        info!("Warning armed: {}", kind);

        WarningOutcome::Armed {
            kind,
            grace_ms: self.config.grace_period_ms,
        }
    }

    /// Feed a clean frame. Returns the kind that was resolved, if any.
    pub fn observe_clear(&mut self) -> Option<ViolationKind> {
        if !self.state.active {
            return None;
        }
        let resolved = self.state.kind;
        self.clear();
        if let Some(kind) = resolved {
            info!("Warning resolved: {} corrected", kind);
        }
        resolved
    }

    /// Whether a new warning may be shown at `now_ms`
    pub fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        match self.state.last_shown_at_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.config.cooldown_ms,
            None => true,
        }
    }

    /// Drop any active warning (on lockdown). Cooldown history is kept.
    pub fn reset(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.state.active = false;
        self.state.kind = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_violation_arms() {
        let mut ctl = WarningController::default();
        assert_eq!(
            ctl.observe(ViolationKind::TurningLeft, 0),
            WarningOutcome::Armed { kind: ViolationKind::TurningLeft, grace_ms: 8_000 }
        );
        assert!(ctl.is_active());
        assert_eq!(ctl.state().last_shown_at_ms, Some(0));
    }

    #[test]
    fn test_countdown_then_escalation() {
        let mut ctl = WarningController::default();
        ctl.observe(ViolationKind::TurningLeft, 1_000);

        assert_eq!(
            ctl.observe(ViolationKind::TurningLeft, 4_000),
            WarningOutcome::Pending { kind: ViolationKind::TurningLeft, remaining_ms: 5_000 }
        );
        assert_eq!(
            ctl.observe(ViolationKind::TurningLeft, 9_000),
            WarningOutcome::Escalated(ViolationKind::TurningLeft)
        );
        assert!(!ctl.is_active());
    }

    #[test]
    fn test_clear_frame_resolves() {
        let mut ctl = WarningController::default();
        ctl.observe(ViolationKind::TurningRight, 0);
        assert_eq!(ctl.observe_clear(), Some(ViolationKind::TurningRight));
        assert_eq!(ctl.observe_clear(), None);
    }

    #[test]
    fn test_other_kind_cannot_preempt() {
        let mut ctl = WarningController::default();
        ctl.observe(ViolationKind::TurningLeft, 0);
        assert_eq!(ctl.observe(ViolationKind::TurningRight, 100), WarningOutcome::Suppressed);
        assert_eq!(ctl.state().kind, Some(ViolationKind::TurningLeft));
        // Different kind never escalates the armed one
        assert_eq!(ctl.observe(ViolationKind::TurningRight, 20_000), WarningOutcome::Suppressed);
        assert!(ctl.is_active());
    }

    #[test]
    fn test_cooldown_blocks_new_warning() {
        let mut ctl = WarningController::default();
        ctl.observe(ViolationKind::TurningLeft, 0);
        ctl.observe_clear();

        assert_eq!(ctl.observe(ViolationKind::TurningLeft, 14_999), WarningOutcome::Suppressed);
        assert!(matches!(
            ctl.observe(ViolationKind::TurningLeft, 15_000),
            WarningOutcome::Armed { .. }
        ));
    }

    #[test]
    fn test_reset_keeps_cooldown() {
        let mut ctl = WarningController::default();
        ctl.observe(ViolationKind::Talking, 0);
        ctl.reset();
        assert!(!ctl.is_active());
        assert!(!ctl.cooldown_elapsed(1_000));
    }

    proptest! {
        #[test]
        fn prop_resolved_warning_never_escalates(correct_at in 0u64..8_000) {
            let mut ctl = WarningController::default();
            ctl.observe(ViolationKind::TurningLeft, 0);
            let mut t = 100;
            while t < correct_at {
                let outcome = ctl.observe(ViolationKind::TurningLeft, t);
                prop_assert!(matches!(outcome, WarningOutcome::Pending { .. }), "expected WarningOutcome::Pending");
                t += 100;
            }
            prop_assert_eq!(ctl.observe_clear(), Some(ViolationKind::TurningLeft));
            // Violation resumes right after: cooldown holds it back
            prop_assert_eq!(ctl.observe(ViolationKind::TurningLeft, correct_at + 100), WarningOutcome::Suppressed);
        }
    }
}
