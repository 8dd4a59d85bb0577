//! Exam Session Orchestration
//!
//! Pre-check gate, the monitoring state machine and the tokio runtime that
//! drives it from a camera.
//!
//! Flow: system check, camera start, ban check, environment scan, face
//! acquisition, then the monitoring loop with lockdowns until the session
//! ends or the learner is banned.

pub mod config;
pub mod controller;
pub mod error;
pub mod intent;
pub mod precheck;
pub mod runtime;

pub use config::{LoopTiming, PolicyConfig};
pub use controller::{ExamSessionController, HudSnapshot, LogEntry, SessionPhase};
pub use error::{EnvironmentError, SessionError};
pub use intent::{Intent, VideoSlot};
pub use precheck::{
    check_system, cpu_score, detect_lockdown_browser, EnvironmentScan, LockdownBrowser, LockdownKind,
    PrecheckPolicy, ScanConfig, ScanStatus, SystemReport, SystemSample,
};
pub use runtime::{IntentSink, SessionRuntime};
