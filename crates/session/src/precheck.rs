//! Pre-check gate
//!
//! Runs once per session start: a system requirements check, then an
//! environment pan-scan in which the learner turns their head across the
//! room. Neither step runs again once the session is marked verified.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// System check thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecheckPolicy {
    /// Refuse to start outside a lockdown browser
    pub require_lockdown_browser: bool,
    pub min_cpu_score: f64,
    pub min_ram_gb: f64,
    pub min_ram_gb_lockdown: f64,
    pub max_latency_ms: f64,
    pub min_storage_gb: f64,
    pub min_storage_gb_lockdown: f64,
    pub min_seb_version: f64,
}

impl Default for PrecheckPolicy {
    fn default() -> Self {
        Self {
            require_lockdown_browser: false,
            min_cpu_score: 30.0,
            min_ram_gb: 4.0,
            min_ram_gb_lockdown: 6.0,
            max_latency_ms: 150.0,
            min_storage_gb: 1.0,
            min_storage_gb_lockdown: 2.0,
            min_seb_version: 3.0,
        }
    }
}

/// Known lockdown browsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LockdownKind {
    SafeExamBrowser,
    Respondus,
    Examplify,
    TestNav,
    Kiosk,
}

impl fmt::Display for LockdownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockdownKind::SafeExamBrowser => "Safe Exam Browser (SEB)",
            LockdownKind::Respondus => "Respondus LockDown Browser",
            LockdownKind::Examplify => "ExamSoft Examplify",
            LockdownKind::TestNav => "Pearson TestNav",
            LockdownKind::Kiosk => "Kiosk/Fullscreen Mode",
        };
        f.write_str(name)
    }
}

/// Detected lockdown browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockdownBrowser {
    pub kind: LockdownKind,
    pub version: Option<String>,
}

/// Identify a lockdown browser from its user agent
pub fn detect_lockdown_browser(user_agent: &str, fullscreen: bool) -> Option<LockdownBrowser> {
    let kind = if user_agent.contains("SEB/") {
        let version = user_agent
            .split("SEB/")
            .nth(1)
            .map(seb_version)
            .filter(|v| !v.is_empty());
        return Some(LockdownBrowser {
            kind: LockdownKind::SafeExamBrowser,
            version,
        });
    } else if user_agent.contains("RLDBrowser") || user_agent.contains("LockDown") {
        LockdownKind::Respondus
    } else if user_agent.contains("Examplify") || user_agent.contains("ExamSoft") {
        LockdownKind::Examplify
    } else if user_agent.contains("TestNav") || user_agent.contains("Pearson") {
        LockdownKind::TestNav
    } else if fullscreen {
        LockdownKind::Kiosk
    } else {
        return None;
    };

    Some(LockdownBrowser { kind, version: None })
}

// "3.5.0 (x64)" -> "3.5"
fn seb_version(rest: &str) -> String {
    let mut parts = rest.split(|c: char| !c.is_ascii_digit());
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) if !major.is_empty() && !minor.is_empty() => {
            format!("{}.{}", major, minor)
        }
        _ => String::new(),
    }
}

/// Host measurements fed to the system check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSample {
    pub user_agent: String,
    pub fullscreen: bool,
    pub cpu_score: f64,
    pub ram_gb: Option<f64>,
    pub gpu_renderer: Option<String>,
    /// `None` when the connectivity probe failed
    pub latency_ms: Option<f64>,
    pub free_storage_gb: Option<f64>,
}

impl SystemSample {
    /// Measure what the host exposes
    pub fn measure_host(user_agent: impl Into<String>, fullscreen: bool) -> Self {
        Self {
            user_agent: user_agent.into(),
            fullscreen,
            cpu_score: cpu_score(Duration::from_millis(100)),
            ram_gb: host_ram_gb(),
            ..Default::default()
        }
    }
}

/// Thousands of square roots per `budget`
pub fn cpu_score(budget: Duration) -> f64 {
    let start = Instant::now();
    let mut iterations: u64 = 0;
    let mut acc = 0.0f64;
    while start.elapsed() < budget {
        acc += ((iterations % 1000) as f64).sqrt();
        iterations += 1;
    }
    debug!("CPU benchmark checksum {:.1}", acc);
    iterations as f64 / 1000.0
}

fn host_ram_gb() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / (1024.0 * 1024.0))
}

/// Outcome of the system requirements check
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub summary: String,
    pub is_secure: bool,
    pub lockdown: Option<LockdownBrowser>,
}

impl SystemReport {
    pub fn has_warnings(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Evaluate a sample against the policy
pub fn check_system(sample: &SystemSample, policy: &PrecheckPolicy) -> SystemReport {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let lockdown = detect_lockdown_browser(&sample.user_agent, sample.fullscreen);
    let is_secure = lockdown.is_some();

    if !is_secure {
        issues.push("SECURITY RISK: Not running in a lockdown browser".to_string());
        recommendations.push("Install and use Safe Exam Browser (SEB) or equivalent lockdown browser".to_string());
        recommendations.push("Contact your institution's IT department for lockdown browser setup".to_string());
        if !sample.fullscreen {
            issues.push("Browser not in full-screen kiosk mode".to_string());
            recommendations.push("Enable full-screen mode (F11) for secure exam environment".to_string());
        }
    }

    if sample.cpu_score < policy.min_cpu_score {
        issues.push("Slow CPU detected - may cause frame drops".to_string());
        recommendations.push("Close unnecessary background processes before starting exam".to_string());
    }

    if let Some(ram) = sample.ram_gb {
        let min_ram = if is_secure { policy.min_ram_gb_lockdown } else { policy.min_ram_gb };
        if ram < min_ram {
            issues.push(format!("Low RAM ({}GB) - minimum {}GB recommended", ram, min_ram));
            recommendations.push("Close all other applications before starting the exam".to_string());
        }
    }

    if let Some(renderer) = &sample.gpu_renderer {
        if renderer.contains("Software") || renderer.contains("Microsoft") {
            issues.push("Software GPU rendering - poor performance".to_string());
            recommendations.push("Enable hardware acceleration".to_string());
        }
    }

    match sample.latency_ms {
        Some(latency) if latency > policy.max_latency_ms => {
            issues.push("High network latency - may affect model loading".to_string());
            recommendations.push("Ensure a stable internet connection".to_string());
        }
        Some(_) => {}
        None => {
            issues.push("Network connectivity issues".to_string());
            recommendations.push("Check network permissions".to_string());
        }
    }

    if let Some(free) = sample.free_storage_gb {
        let min_storage = if is_secure {
            policy.min_storage_gb_lockdown
        } else {
            policy.min_storage_gb
        };
        if free < min_storage {
            issues.push(format!("Low storage ({:.1}GB)", free));
            recommendations.push("Clear browser cache and temporary files".to_string());
        }
    }

    if let Some(LockdownBrowser {
        kind: LockdownKind::SafeExamBrowser,
        version: Some(version),
    }) = &lockdown
    {
        if version.parse::<f64>().map(|v| v < policy.min_seb_version).unwrap_or(false) {
            issues.push(format!("Outdated Safe Exam Browser v{}", version));
            recommendations.push(format!(
                "Update to Safe Exam Browser {:.1}+ for optimal compatibility",
                policy.min_seb_version
            ));
        }
    }

    let summary = match (is_secure, issues.len()) {
        (true, 0) => "Secure lockdown environment - optimal for exams".to_string(),
        (true, n) if n <= 2 => "Secure environment with minor performance issues".to_string(),
        (true, _) => "Performance optimization needed for secure exams".to_string(),
        (false, _) => "SECURITY WARNING: Insecure environment detected".to_string(),
    };

    if issues.is_empty() {
        info!("System check passed: {}", summary);
    } else {
        warn!("System check: {} ({} issues)", summary, issues.len());
    }

    SystemReport {
        issues,
        recommendations,
        summary,
        is_secure,
        lockdown,
    }
}

/// Pan-scan parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub duration_ms: u64,
    /// Progress needed to pass (0-1)
    pub threshold: f32,
    /// Smallest nose movement that counts
    pub min_movement: f32,
    /// Progress per unit of movement
    pub gain: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            duration_ms: 15_000,
            threshold: 0.8,
            min_movement: 0.05,
            gain: 2.0,
        }
    }
}

/// Pan-scan state after a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanStatus {
    InProgress { progress: f32, remaining_ms: u64 },
    Complete,
    Incomplete { progress: f32 },
}

/// Environment pan-scan
#[derive(Debug, Clone)]
pub struct EnvironmentScan {
    config: ScanConfig,
    progress: f32,
    last_x: f32,
    started_at_ms: u64,
}

impl EnvironmentScan {
    pub fn start(config: ScanConfig, now_ms: u64) -> Self {
        info!("Environment scan started ({}ms window)", config.duration_ms);
        Self {
            config,
            progress: 0.0,
            last_x: 0.5,
            started_at_ms: now_ms,
        }
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Feed one sample; `nose_x` is `None` when no face was found
    pub fn observe(&mut self, nose_x: Option<f32>, now_ms: u64) -> ScanStatus {
        if let Some(x) = nose_x {
            let movement = (x - self.last_x).abs();
            if movement > self.config.min_movement {
                self.progress = (self.progress + movement * self.config.gain).min(1.0);
                self.last_x = x;
                debug!("Scan progress {:.0}%", self.progress * 100.0);
            }
        }

        if self.progress >= self.config.threshold {
            info!("Environment scan complete");
            return ScanStatus::Complete;
        }

        let elapsed = now_ms.saturating_sub(self.started_at_ms);
        if elapsed >= self.config.duration_ms {
            warn!("Environment scan incomplete: {:.0}%", self.progress * 100.0);
            return ScanStatus::Incomplete {
                progress: self.progress,
            };
        }

        ScanStatus::InProgress {
            progress: self.progress,
            remaining_ms: self.config.duration_ms - elapsed,
        }
    }
}
