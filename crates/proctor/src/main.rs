//! Exam Proctor - Main Entry Point
//!
//! Usage: `exam-proctor [config.toml]`. While running, type `retry` to re-run
//! a failed pre-check, `strict` to force strict mode, or `quit` to end.

use chrono::Utc;
use evidence::{EvidenceCollector, FrameTap, HttpTransport, UploadQueue};
use perception::{ReplayModel, SyntheticCamera};
use proctor::{
    init_logging, install_metrics, probe_latency, run_server, session_summary, AppState, HudSink, ProctorError,
    Settings,
};
use session::{ExamSessionController, SessionError, SessionRuntime, SystemSample};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strike_ledger::{FileStore, StrikeLedger};
use tokio::io::{AsyncBufReadExt, BufReader as AsyncBufReader};
use tracing::{error, info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let settings = Settings::load(config_path.as_deref())?;
    init_logging(&settings.logging)?;

    info!("=== Exam Proctor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Course {}", settings.policy.course_id);

    let metrics = install_metrics();
    let session_id = Uuid::new_v4();
    let started_at = Utc::now();

    // Ledger
    let store = Arc::new(FileStore::open(&settings.storage.ledger_path)?);
    let ledger = StrikeLedger::load(store, settings.policy.course_id, settings.policy.ledger.clone());
    let controller = ExamSessionController::new(settings.policy.clone(), ledger);

    // Evidence pipeline
    let transport = Arc::new(HttpTransport::new(&settings.uploader)?);
    let queue = UploadQueue::spawn(settings.uploader.clone(), transport);
    let tap = FrameTap::new(5, settings.policy.evidence.jpeg_quality);
    let collector = EvidenceCollector::new(Arc::new(tap.clone()), settings.policy.evidence.clone(), queue.clone());

    // Perception
    let replay_path = settings.replay.path.as_deref().ok_or(ProctorError::NoLandmarkSource)?;
    let model = ReplayModel::from_reader(BufReader::new(File::open(replay_path)?), settings.replay.looped)?;
    info!("Replaying {} landmark frames from {}", model.len(), replay_path);
    let epoch = Instant::now();
    let camera = SyntheticCamera::new(move || epoch.elapsed().as_millis() as u64);

    let mut runtime = SessionRuntime::with_evidence(controller, camera, model, Arc::new(HudSink), collector, tap);

    // Status server
    let (server_stop, server_stopped) = tokio::sync::oneshot::channel::<()>();
    let server = if settings.server.enabled {
        let state = AppState::new(runtime.hud(), metrics, settings.policy.course_id);
        let addr = settings.server.listen_addr.clone();
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = server_stopped.await;
            };
            if let Err(e) = run_server(&addr, state, shutdown).await {
                error!("Status server failed: {}", e);
            }
        }))
    } else {
        None
    };

    let sample = host_sample(&settings).await;
    match runtime.start(&settings.camera, &sample).await {
        Ok(()) => {}
        Err(SessionError::Banned(reason)) => warn!("Session refused: {}", reason),
        Err(SessionError::Environment(err)) => warn!("Pre-check failed: {} (type `retry`)", err),
        Err(e) => return Err(e.into()),
    }

    // Operator console
    let mut lines = AsyncBufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut poll = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = poll.tick() => {
                if runtime.is_stopped() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(cmd)) => match cmd.trim() {
                    "retry" => {
                        let sample = host_sample(&settings).await;
                        if let Err(e) = runtime.retry(&settings.camera, &sample).await {
                            warn!("Retry failed: {}", e);
                        }
                    }
                    "strict" => runtime.force_strict_mode().await,
                    "quit" => break,
                    "" => {}
                    other => warn!("Unknown command: {}", other),
                },
                // stdin closed; keep running until stopped or interrupted
                Ok(None) => stdin_open = false,
                Err(e) => warn!("Console read failed: {}", e),
            }
        }
    }

    // Shutdown
    let hud = runtime.shutdown().await;
    match queue.flush().await {
        Ok(0) => {}
        Ok(pending) => warn!("{} evidence batch(es) still pending at shutdown", pending),
        Err(e) => warn!("Evidence flush failed: {}", e),
    }

    let summary = session_summary(session_id, &settings.policy, started_at, &hud, queue.enqueued());
    info!(
        "Session {} ended: phase={}, strikes={}, evidence={}",
        summary.session_id, hud.phase, summary.strikes, summary.evidence_enqueued
    );
    if let Err(e) = queue.send_summary(summary).await {
        warn!("Session summary not delivered: {}", e);
    }

    let _ = server_stop.send(());
    if let Some(handle) = server {
        let _ = handle.await;
    }
    Ok(())
}

async fn host_sample(settings: &Settings) -> SystemSample {
    let mut sample = SystemSample::measure_host(settings.client.user_agent.clone(), settings.client.fullscreen);
    sample.latency_ms = probe_latency(settings.latency_probe_url(), Duration::from_secs(5)).await;
    sample
}
