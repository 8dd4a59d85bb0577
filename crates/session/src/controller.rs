//! Exam session state machine
//!
//! Pure decision core: every input is a detection plus a monotonic
//! millisecond timestamp, every output is a list of [`Intent`]s. The only
//! side effect is the strike ledger write.

use crate::config::PolicyConfig;
use crate::error::EnvironmentError;
use crate::intent::{Intent, VideoSlot};
use crate::precheck::{check_system, EnvironmentScan, ScanStatus, SystemReport, SystemSample};
use chrono::{DateTime, Utc};
use evidence::EvidenceCapture;
use perception::Detection;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use strike_ledger::{StrikeLedger, StrikeOutcome};
use suspicion::{MonitorMode, SuspicionEngine, SuspicionState, ViolationKind};
use tracing::{debug, info, warn};
use warning::{WarningController, WarningOutcome};

const PROMPT_POSITION: &str = "Position yourself in front of the camera";
const PROMPT_FACE_DETECTED: &str = "Face detected! Starting monitoring...";
const PROMPT_RESUME: &str = "Position yourself in camera view to resume";

/// Top-level session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    PreCheck,
    AwaitingFace,
    Monitoring,
    Lockdown,
    ResumedMonitoring,
    Banned,
}

impl SessionPhase {
    /// Whether frames are classified in this phase
    pub fn is_monitoring(&self) -> bool {
        matches!(self, SessionPhase::Monitoring | SessionPhase::ResumedMonitoring)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One HUD log line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Read-only view for the HUD and status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HudSnapshot {
    pub phase: SessionPhase,
    pub level_percent: f32,
    pub mode: MonitorMode,
    pub strikes: u32,
    pub remaining_strikes: u32,
    pub active_warning: Option<ViolationKind>,
    pub ban_reason: Option<String>,
    /// Newest first
    pub log: Vec<LogEntry>,
}

/// Orchestrates suspicion, warnings, strikes and evidence for one session
pub struct ExamSessionController {
    policy: PolicyConfig,
    engine: SuspicionEngine,
    state: SuspicionState,
    warnings: WarningController,
    ledger: StrikeLedger,
    evidence: EvidenceCapture,
    phase: SessionPhase,
    system_report: Option<SystemReport>,
    scan: Option<EnvironmentScan>,
    face_seen_at_ms: Option<u64>,
    last_prompt: Option<&'static str>,
    last_refresh_ms: Option<u64>,
    log: VecDeque<LogEntry>,
}

impl ExamSessionController {
    /// Create a controller over a loaded ledger.
    ///
    /// A banned ledger starts in `Banned`, a verified one skips the pre-check.
    pub fn new(policy: PolicyConfig, ledger: StrikeLedger) -> Self {
        let engine = SuspicionEngine::new(policy.suspicion.clone());
        let mode = if ledger.strict_mode_due() || policy.start_in_strict_mode {
            MonitorMode::Strict
        } else {
            MonitorMode::Normal
        };
        let phase = if ledger.is_banned() {
            SessionPhase::Banned
        } else if ledger.is_verified() {
            SessionPhase::AwaitingFace
        } else {
            SessionPhase::PreCheck
        };

        info!(
            "Session controller for course {}: phase={}, mode={:?}, strikes={}",
            policy.course_id,
            phase,
            mode,
            ledger.count()
        );

        Self {
            state: engine.initial_state(mode),
            engine,
            warnings: WarningController::new(policy.warning.clone()),
            evidence: EvidenceCapture::new(&policy.evidence),
            ledger,
            phase,
            system_report: None,
            scan: None,
            face_seen_at_ms: None,
            last_prompt: None,
            last_refresh_ms: None,
            log: VecDeque::with_capacity(policy.log_capacity),
            policy,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SuspicionState {
        &self.state
    }

    pub fn ledger(&self) -> &StrikeLedger {
        &self.ledger
    }

    pub fn warnings(&self) -> &WarningController {
        &self.warnings
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn system_report(&self) -> Option<&SystemReport> {
        self.system_report.as_ref()
    }

    /// HUD log, newest first
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn snapshot(&self) -> HudSnapshot {
        HudSnapshot {
            phase: self.phase,
            level_percent: self.state.percent(),
            mode: self.state.mode,
            strikes: self.ledger.count(),
            remaining_strikes: self.ledger.remaining_strikes(),
            active_warning: self.warnings.state().kind,
            ban_reason: self.ledger.ban_record().map(|b| b.reason.clone()),
            log: self.log.iter().cloned().collect(),
        }
    }

    /// Initial presentation for the current phase
    pub fn begin(&mut self) -> Vec<Intent> {
        let mut intents = Vec::new();
        match self.phase {
            SessionPhase::Banned => {
                let reason = self.ban_reason();
                intents.push(Intent::ShowBan { reason });
                intents.push(Intent::StopMonitoring);
            }
            SessionPhase::AwaitingFace => {
                intents.push(Intent::MoveVideo(VideoSlot::Shield));
                self.prompt(PROMPT_POSITION, &mut intents);
            }
            _ => intents.push(Intent::MoveVideo(VideoSlot::Shield)),
        }
        intents
    }

    /// Pre-check step 1. Warnings only block when a lockdown browser is required.
    pub fn run_system_check(&mut self, sample: &SystemSample) -> Result<SystemReport, EnvironmentError> {
        let report = check_system(sample, &self.policy.precheck);
        if self.policy.precheck.require_lockdown_browser && !report.is_secure {
            return Err(EnvironmentError::InsecureEnvironment(report.summary));
        }
        self.system_report = Some(report.clone());
        Ok(report)
    }

    /// Pre-check step 2: start the pan-scan window
    pub fn start_scan(&mut self, now_ms: u64) -> Vec<Intent> {
        if self.phase != SessionPhase::PreCheck {
            return Vec::new();
        }
        if self.system_report.is_none() {
            warn!("Environment scan requested before the system check");
            return Vec::new();
        }
        self.scan = Some(EnvironmentScan::start(self.policy.scan.clone(), now_ms));
        vec![Intent::ScanStarted {
            duration_secs: self.policy.scan.duration_ms.div_ceil(1000),
        }]
    }

    /// Drop pre-check progress so the whole gate runs again
    pub fn retry_precheck(&mut self) {
        if self.phase == SessionPhase::PreCheck {
            self.system_report = None;
            self.scan = None;
        }
    }

    /// Operator override: enable the strict checks now
    pub fn force_strict_mode(&mut self) -> Vec<Intent> {
        let mut intents = Vec::new();
        if self.phase != SessionPhase::Banned {
            self.enter_strict(&mut intents);
        }
        intents
    }

    /// Process one sampled frame
    pub fn on_frame(&mut self, detection: &Detection, now_ms: u64) -> Vec<Intent> {
        let mut intents = Vec::new();
        if self.phase == SessionPhase::Banned {
            return intents;
        }

        self.refresh_ledger(now_ms, &mut intents);

        match self.phase {
            SessionPhase::PreCheck => self.scan_frame(detection, now_ms, &mut intents),
            SessionPhase::AwaitingFace | SessionPhase::Lockdown => {
                self.await_face(detection, now_ms, &mut intents)
            }
            SessionPhase::Monitoring | SessionPhase::ResumedMonitoring => {
                self.monitor(detection, now_ms, &mut intents)
            }
            SessionPhase::Banned => {}
        }
        intents
    }

    fn refresh_ledger(&mut self, now_ms: u64, intents: &mut Vec<Intent>) {
        if let Some(last) = self.last_refresh_ms {
            if now_ms.saturating_sub(last) < self.policy.timing.ledger_refresh_ms {
                return;
            }
        }
        self.last_refresh_ms = Some(now_ms);

        if self.ledger.refresh() {
            self.ban(intents);
            return;
        }
        if self.ledger.strict_mode_due() {
            self.enter_strict(intents);
        }
    }

    fn scan_frame(&mut self, detection: &Detection, now_ms: u64, intents: &mut Vec<Intent>) {
        let Some(scan) = self.scan.as_mut() else { return };
        let nose_x = detection.present.then_some(detection.nose_x);

        match scan.observe(nose_x, now_ms) {
            ScanStatus::InProgress { progress, remaining_ms } => {
                intents.push(Intent::ScanProgress {
                    percent: (progress * 100.0).floor() as u8,
                    remaining_secs: remaining_ms.div_ceil(1000),
                });
            }
            ScanStatus::Complete => {
                self.scan = None;
                self.phase = SessionPhase::AwaitingFace;
                intents.push(Intent::ScanComplete);
                self.push_log("Environment verified");
                self.prompt(PROMPT_POSITION, intents);
            }
            ScanStatus::Incomplete { progress } => {
                self.scan = None;
                self.system_report = None;
                intents.push(Intent::ShowEnvironmentError(EnvironmentError::ScanIncomplete {
                    progress,
                }));
            }
        }
    }

    fn await_face(&mut self, detection: &Detection, now_ms: u64, intents: &mut Vec<Intent>) {
        if !detection.present {
            self.face_seen_at_ms = None;
            let prompt = if self.phase == SessionPhase::Lockdown {
                PROMPT_RESUME
            } else {
                PROMPT_POSITION
            };
            self.prompt(prompt, intents);
            return;
        }

        let first_seen = *self.face_seen_at_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(first_seen) < self.policy.timing.face_confirm_ms {
            self.prompt(PROMPT_FACE_DETECTED, intents);
            return;
        }
        self.face_seen_at_ms = None;
        self.last_prompt = None;

        if self.phase == SessionPhase::Lockdown {
            self.phase = SessionPhase::ResumedMonitoring;
            self.state.reset();
            info!("Face re-acquired, monitoring resumed");
            self.push_log("Monitoring resumed");
            intents.push(Intent::MoveVideo(VideoSlot::Hud));
            intents.push(Intent::Resume);
        } else {
            self.ledger.mark_verified();
            self.phase = SessionPhase::Monitoring;
            self.state.reset();
            info!("Face acquired, monitoring started");
            self.push_log("Monitoring started");
            intents.push(Intent::SessionStarted);
            intents.push(Intent::MoveVideo(VideoSlot::Hud));
            if self.state.is_strict() {
                intents.push(Intent::ModeChanged(MonitorMode::Strict));
            }
        }
        intents.push(Intent::UpdateMeter { percent: 0.0 });
    }

    fn monitor(&mut self, detection: &Detection, now_ms: u64, intents: &mut Vec<Intent>) {
        let kind = self.engine.classify(detection, self.state.mode);

        match kind {
            Some(ViolationKind::NoFace) => {
                // Fast path: straight to heat, no warning
                self.engine.accumulate(&mut self.state, kind);
            }
            Some(kind) => match self.warnings.observe(kind, now_ms) {
                WarningOutcome::Armed { kind, grace_ms } => {
                    self.push_log(format!("Warning: {}", kind));
                    intents.push(Intent::ShowWarning {
                        kind,
                        guidance: kind.guidance(),
                        grace_secs: grace_ms.div_ceil(1000),
                    });
                }
                WarningOutcome::Pending { remaining_ms, .. } => {
                    intents.push(Intent::UpdateCountdown {
                        remaining_secs: remaining_ms.div_ceil(1000),
                    });
                }
                WarningOutcome::Escalated(kind) => {
                    intents.push(Intent::DismissWarning { corrected: false });
                    self.escalate(kind, now_ms, intents);
                    if self.phase == SessionPhase::Banned {
                        return;
                    }
                }
                WarningOutcome::Suppressed => {
                    self.engine.accumulate_suppressed(&mut self.state);
                }
            },
            None => {
                if self.warnings.observe_clear().is_some() {
                    self.engine.reward_correction(&mut self.state);
                    self.push_log("Position corrected - Warning dismissed");
                    intents.push(Intent::DismissWarning { corrected: true });
                }
                self.engine.accumulate(&mut self.state, None);
            }
        }

        if self.state.is_saturated() {
            let reason = kind.map(|k| k.as_str()).unwrap_or("Suspicious activity");
            self.lockdown(reason, intents);
            if self.phase == SessionPhase::Banned {
                return;
            }
        }

        metrics::gauge!("proctor_suspicion_level").set(self.state.display_level() as f64);
        intents.push(Intent::UpdateMeter {
            percent: self.state.percent(),
        });
    }

    /// Grace period ran out. Counts a strike only when evidence can back it.
    fn escalate(&mut self, kind: ViolationKind, now_ms: u64, intents: &mut Vec<Intent>) {
        if !self.evidence.try_begin(now_ms) {
            self.engine.accumulate_downgraded(&mut self.state);
            self.push_log(format!("{} continues (No evidence - cooldown active)", kind));
            return;
        }

        intents.push(Intent::CaptureClip {
            reason: kind.as_str().to_string(),
        });
        let outcome = self.record_strike(kind.as_str(), intents);
        self.push_log(format!("EVIDENCE CAPTURED: {} - Video clip recorded", kind));

        if outcome.banned {
            self.ban(intents);
            return;
        }
        self.state.reset();

        // Benefit of the doubt below the strict threshold
        if self.state.is_strict() && outcome.count < self.policy.ledger.strict_threshold {
            self.state.mode = MonitorMode::Normal;
            info!("Strict mode relaxed after evidence-backed strike {}", outcome.count);
            self.push_log("Aggressive tracking disabled - Continue exam with caution");
            intents.push(Intent::ModeChanged(MonitorMode::Normal));
        }

        if outcome.strict_mode_entered {
            self.enter_strict(intents);
        }
    }

    /// Heat saturated: always strikes, always captures a still
    fn lockdown(&mut self, reason: &str, intents: &mut Vec<Intent>) {
        let outcome = self.record_strike(reason, intents);
        self.push_log(format!("STRIKE {} - {}", outcome.count, reason));

        if outcome.banned {
            self.ban(intents);
            return;
        }
        if outcome.strict_mode_entered {
            self.enter_strict(intents);
        }

        if self.warnings.is_active() {
            intents.push(Intent::DismissWarning { corrected: false });
        }
        self.warnings.reset();
        self.state.reset();
        self.face_seen_at_ms = None;
        self.last_prompt = None;
        self.phase = SessionPhase::Lockdown;

        let ban_threshold = self.policy.ledger.ban_threshold;
        warn!("Lockdown: {} ({} strikes remaining)", reason, self.ledger.remaining_strikes());

        intents.push(Intent::CaptureStill {
            reason: reason.to_string(),
        });
        intents.push(Intent::MoveVideo(VideoSlot::Shield));
        intents.push(Intent::ShowLockdown {
            reason: reason.to_string(),
            remaining_strikes: self.ledger.remaining_strikes(),
            final_warning: outcome.count >= ban_threshold.saturating_sub(2),
        });
    }

    fn ban(&mut self, intents: &mut Vec<Intent>) {
        let reason = self.ban_reason();
        warn!("Session banned: {}", reason);

        self.phase = SessionPhase::Banned;
        self.warnings.reset();
        self.scan = None;
        self.push_log(format!("PERMANENTLY BANNED - {}", reason));

        intents.push(Intent::CaptureStill {
            reason: format!("BANNED: {}", reason),
        });
        intents.push(Intent::MoveVideo(VideoSlot::Shield));
        intents.push(Intent::ShowBan { reason });
        intents.push(Intent::StopMonitoring);
    }

    fn record_strike(&mut self, reason: &str, intents: &mut Vec<Intent>) -> StrikeOutcome {
        let outcome = self.ledger.record_strike(reason, Utc::now());
        metrics::counter!("proctor_strikes_total").increment(1);
        intents.push(Intent::StrikeRecorded {
            count: outcome.count,
            reason: reason.to_string(),
        });
        outcome
    }

    fn enter_strict(&mut self, intents: &mut Vec<Intent>) {
        if self.state.is_strict() {
            return;
        }
        self.state.mode = MonitorMode::Strict;
        info!("Strict mode enabled at {} strikes", self.ledger.count());
        self.push_log("STRICT MODE enabled");
        intents.push(Intent::ModeChanged(MonitorMode::Strict));
    }

    fn ban_reason(&self) -> String {
        self.ledger
            .ban_record()
            .map(|b| b.reason.clone())
            .unwrap_or_else(|| "Multiple security violations".to_string())
    }

    fn prompt(&mut self, text: &'static str, intents: &mut Vec<Intent>) {
        if self.last_prompt != Some(text) {
            self.last_prompt = Some(text);
            intents.push(Intent::Prompt(text));
        }
    }

    fn push_log(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("HUD log: {}", message);
        self.log.push_front(LogEntry {
            at: Utc::now(),
            message,
        });
        self.log.truncate(self.policy.log_capacity);
    }
}
