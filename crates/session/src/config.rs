//! Session policy configuration

use crate::precheck::{PrecheckPolicy, ScanConfig};
use evidence::EvidencePolicy;
use serde::{Deserialize, Serialize};
use strike_ledger::LedgerPolicy;
use suspicion::SuspicionConfig;
use warning::WarningConfig;

/// Loop and watchdog timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopTiming {
    /// Minimum gap between two classified frames (milliseconds)
    pub frame_interval_ms: u64,
    /// Free-running tick the frame gate sits under
    pub render_tick_ms: u64,
    pub watchdog_interval_ms: u64,
    /// Loop is considered stalled after this long without a tick
    pub watchdog_stale_ms: u64,
    /// Minimum gap between two ledger re-reads; 0 re-reads every frame
    pub ledger_refresh_ms: u64,
    /// Face must stay acquired this long before monitoring (re)starts
    pub face_confirm_ms: u64,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            render_tick_ms: 16,
            watchdog_interval_ms: 1_000,
            watchdog_stale_ms: 2_000,
            ledger_refresh_ms: 0,
            face_confirm_ms: 1_000,
        }
    }
}

/// Externally supplied numeric policy for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub course_id: u64,
    pub suspicion: SuspicionConfig,
    pub warning: WarningConfig,
    pub ledger: LedgerPolicy,
    pub evidence: EvidencePolicy,
    pub precheck: PrecheckPolicy,
    pub scan: ScanConfig,
    #[serde(rename = "loop")]
    pub timing: LoopTiming,
    /// Start every session with the strict checks enabled
    pub start_in_strict_mode: bool,
    /// Evidence retention on the server side
    pub retention_days: u32,
    /// HUD log length
    pub log_capacity: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            course_id: 0,
            suspicion: SuspicionConfig::default(),
            warning: WarningConfig::default(),
            ledger: LedgerPolicy::default(),
            evidence: EvidencePolicy::default(),
            precheck: PrecheckPolicy::default(),
            scan: ScanConfig::default(),
            timing: LoopTiming::default(),
            start_in_strict_mode: false,
            retention_days: 30,
            log_capacity: 10,
        }
    }
}

impl PolicyConfig {
    /// Policy for unit tests and replays: no face-confirm delay
    pub fn immediate() -> Self {
        Self {
            timing: LoopTiming {
                face_confirm_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
