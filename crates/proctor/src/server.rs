//! Local status server
//!
//! Read-only endpoints for an invigilator dashboard or a kiosk wrapper.

use crate::ProctorError;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use session::{HudSnapshot, SessionPhase};
use std::future::Future;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hud: watch::Receiver<HudSnapshot>,
    pub metrics: Option<PrometheusHandle>,
    pub course_id: u64,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(hud: watch::Receiver<HudSnapshot>, metrics: Option<PrometheusHandle>, course_id: u64) -> Self {
        Self {
            hud,
            metrics,
            course_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub course_id: u64,
    pub phase: SessionPhase,
    pub monitoring: bool,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let phase = state.hud.borrow().phase;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let status = match phase {
        SessionPhase::Banned => "banned",
        SessionPhase::Lockdown => "locked",
        _ => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        course_id: state.course_id,
        phase,
        monitoring: phase.is_monitoring(),
    })
}

async fn status_handler(State(state): State<AppState>) -> Json<HudSnapshot> {
    Json(state.hud.borrow().clone())
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed".to_string()),
    }
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ProctorError> {
    let app = create_router(state);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

/// Run the server
pub async fn run_server(
    addr: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ProctorError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Starting status server on {}", addr);
    serve(listener, state, shutdown).await
}
