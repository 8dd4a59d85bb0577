//! Exam Proctor Client
//!
//! Settings, logging, metrics and the local status server around the
//! session runtime.

pub mod server;
pub mod settings;
pub mod sink;

pub use server::{create_router, run_server, serve, AppState};
pub use settings::Settings;
pub use sink::HudSink;

use chrono::{DateTime, Utc};
use evidence::SessionSummary;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use session::{HudSnapshot, PolicyConfig};
use settings::LoggingSettings;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

/// Client error types
#[derive(Error, Debug)]
pub enum ProctorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No landmark source configured (set replay.path)")]
    NoLandmarkSource,

    #[error(transparent)]
    Session(#[from] session::SessionError),

    #[error(transparent)]
    Perception(#[from] perception::PerceptionError),

    #[error(transparent)]
    Store(#[from] strike_ledger::StoreError),

    #[error(transparent)]
    Upload(#[from] evidence::UploadError),
}

/// Initialize logging
pub fn init_logging(settings: &LoggingSettings) -> Result<(), ProctorError> {
    let level = settings.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);

    let result = if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| ProctorError::Logging(e.to_string()))
}

/// Install the Prometheus recorder; metrics stay no-ops when this fails
pub fn install_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics exporter unavailable: {}", e);
            None
        }
    }
}

/// Round-trip time of a HEAD request, `None` when the host is unreachable
pub async fn probe_latency(url: &str, timeout: Duration) -> Option<f64> {
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
    let started = Instant::now();
    match client.head(url).send().await {
        Ok(_) => {
            let ms = started.elapsed().as_secs_f64() * 1_000.0;
            debug!("Latency probe {}: {:.0}ms", url, ms);
            Some(ms)
        }
        Err(e) => {
            warn!("Latency probe failed for {}: {}", url, e);
            None
        }
    }
}

/// End-of-session report for the summary endpoint
pub fn session_summary(
    session_id: Uuid,
    policy: &PolicyConfig,
    started_at: DateTime<Utc>,
    hud: &HudSnapshot,
    evidence_enqueued: u64,
) -> SessionSummary {
    SessionSummary {
        session_id,
        course_id: policy.course_id,
        started_at,
        ended_at: Utc::now(),
        strikes: hud.strikes,
        banned: hud.ban_reason.is_some(),
        ban_reason: hud.ban_reason.clone(),
        evidence_enqueued,
        retention_days: policy.retention_days,
    }
}
