//! Terminal rendering of session intents

use session::{Intent, IntentSink, VideoSlot};
use suspicion::MonitorMode;
use tracing::{info, warn};

/// Renders intents as structured log lines under the `hud` target
#[derive(Debug, Default)]
pub struct HudSink;

impl IntentSink for HudSink {
    fn apply(&self, intent: &Intent) {
        if let Intent::ShowWarning { kind, .. } = intent {
            metrics::counter!("proctor_warnings_total", "kind" => kind.as_str()).increment(1);
        }

        let Some(line) = render(intent) else { return };
        if is_alert(intent) {
            warn!(target: "hud", "{}", line);
        } else {
            info!(target: "hud", "{}", line);
        }
    }
}

fn is_alert(intent: &Intent) -> bool {
    matches!(
        intent,
        Intent::ShowEnvironmentError(_)
            | Intent::ShowWarning { .. }
            | Intent::ShowLockdown { .. }
            | Intent::ShowBan { .. }
            | Intent::StrikeRecorded { .. }
    )
}

/// One display line per intent; `None` for high-frequency updates
pub fn render(intent: &Intent) -> Option<String> {
    let line = match intent {
        Intent::ShowEnvironmentError(err) => {
            format!("{}: {} ({})", err.title(), err.remediation(), err)
        }
        Intent::ScanStarted { duration_secs } => format!(
            "ENVIRONMENT SCAN: slowly turn your head left and right ({}s)",
            duration_secs
        ),
        Intent::ScanProgress { percent, remaining_secs } => {
            format!("Scanning... {}% ({}s)", percent, remaining_secs)
        }
        Intent::ScanComplete => "Environment verified".to_string(),
        Intent::Prompt(text) => text.to_string(),
        Intent::SessionStarted => "Exam started - monitoring active".to_string(),
        Intent::ShowWarning {
            guidance, grace_secs, ..
        } => format!(
            "{} [{}s to correct] {}",
            guidance.message,
            grace_secs,
            guidance.instructions.join("; ")
        ),
        Intent::UpdateCountdown { .. } | Intent::UpdateMeter { .. } => return None,
        Intent::DismissWarning { corrected: true } => "Position corrected - Warning dismissed".to_string(),
        Intent::DismissWarning { corrected: false } => return None,
        Intent::CaptureClip { reason } => format!("Recording evidence: {}", reason),
        Intent::CaptureStill { reason } => format!("Capturing still: {}", reason),
        Intent::StrikeRecorded { count, reason } => format!("STRIKE {} - {}", count, reason),
        Intent::ShowLockdown {
            reason,
            remaining_strikes,
            final_warning,
        } => {
            let mut line = format!(
                "EXAM PAUSED: {} ({} strike(s) remaining before permanent ban)",
                reason, remaining_strikes
            );
            if *final_warning {
                line.push_str(" FINAL WARNING");
            }
            line
        }
        Intent::Resume => "Monitoring resumed".to_string(),
        Intent::ModeChanged(MonitorMode::Strict) => "STRICT MODE enabled".to_string(),
        Intent::ModeChanged(MonitorMode::Normal) => {
            "Aggressive tracking disabled - Continue exam with caution".to_string()
        }
        Intent::MoveVideo(VideoSlot::Shield) => "Video: shield".to_string(),
        Intent::MoveVideo(VideoSlot::Hud) => "Video: HUD".to_string(),
        Intent::ShowBan { reason } => format!("ACCESS DENIED - PERMANENTLY BANNED: {}", reason),
        Intent::StopMonitoring => "Monitoring stopped".to_string(),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::EnvironmentError;
    use suspicion::ViolationKind;

    #[test]
    fn test_lockdown_line_flags_final_warning() {
        let line = render(&Intent::ShowLockdown {
            reason: "No Face".to_string(),
            remaining_strikes: 2,
            final_warning: true,
        })
        .unwrap();
        assert!(line.contains("No Face"));
        assert!(line.contains("2 strike(s)"));
        assert!(line.ends_with("FINAL WARNING"));
    }

    #[test]
    fn test_warning_line_carries_guidance() {
        let kind = ViolationKind::TurningLeft;
        let line = render(&Intent::ShowWarning {
            kind,
            guidance: kind.guidance(),
            grace_secs: 8,
        })
        .unwrap();
        assert!(line.starts_with(kind.guidance().message));
        assert!(line.contains("[8s to correct]"));
    }

    #[test]
    fn test_high_frequency_updates_are_silent() {
        assert!(render(&Intent::UpdateMeter { percent: 40.0 }).is_none());
        assert!(render(&Intent::UpdateCountdown { remaining_secs: 3 }).is_none());
        assert!(render(&Intent::DismissWarning { corrected: false }).is_none());
    }

    #[test]
    fn test_environment_error_line() {
        let line = render(&Intent::ShowEnvironmentError(EnvironmentError::CameraInUse)).unwrap();
        assert!(line.starts_with("Camera In Use"));
        assert!(is_alert(&Intent::ShowEnvironmentError(EnvironmentError::CameraInUse)));
    }
}
