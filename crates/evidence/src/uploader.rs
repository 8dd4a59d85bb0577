//! Evidence uploader
//!
//! `UploadQueue` is a cheap handle over an mpsc channel. A single worker
//! task owns the transport and the retry backlog; enqueueing never blocks
//! and never fails the caller.

use crate::item::{EvidenceItem, EvidenceKind};
use crate::UploadError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Uploader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Evidence endpoint
    pub upload_url: String,
    /// Optional endpoint for the end-of-session summary
    pub summary_url: Option<String>,
    pub course_id: u64,
    /// Anti-forgery token issued by the host
    pub session_token: String,
    /// Failed batches kept for retry; oldest dropped first
    pub backlog_limit: usize,
    pub retry_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Deadline for the summary post on shutdown
    pub summary_deadline_ms: u64,
    pub channel_capacity: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            upload_url: "http://localhost:8080/blocks/ai_proctor/upload.php".to_string(),
            summary_url: None,
            course_id: 0,
            session_token: String::new(),
            backlog_limit: 20,
            retry_interval_ms: 30_000,
            request_timeout_ms: 10_000,
            summary_deadline_ms: 2_000,
            channel_capacity: 64,
        }
    }
}

/// One evidence entry on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub kind: EvidenceKind,
    /// `data:<mime>;base64,...`
    pub payload: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_sec: Option<u32>,
}

impl From<&EvidenceItem> for EvidenceEntry {
    fn from(item: &EvidenceItem) -> Self {
        Self {
            kind: item.kind,
            payload: item.data_url(),
            reason: item.reason_label.clone(),
            duration_sec: item.duration_sec,
        }
    }
}

/// Evidence submission body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub course_id: u64,
    pub session_token: String,
    pub batch: Vec<EvidenceEntry>,
}

/// Evidence submission response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub uploaded: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// End-of-session summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub course_id: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub strikes: u32,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub evidence_enqueued: u64,
    /// Days the server keeps this session's evidence
    pub retention_days: u32,
}

/// Pluggable outbound transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError>;

    async fn send_summary(&self, summary: &SessionSummary) -> Result<(), UploadError>;
}

/// JSON-over-HTTP transport
pub struct HttpTransport {
    client: Client,
    upload_url: String,
    summary_url: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &UploaderConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            upload_url: config.upload_url.clone(),
            summary_url: config.summary_url.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError> {
        let response = self.client.post(&self.upload_url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }

        response
            .json::<UploadResponse>()
            .await
            .map_err(|e| UploadError::Serialization(e.to_string()))
    }

    async fn send_summary(&self, summary: &SessionSummary) -> Result<(), UploadError> {
        let Some(url) = &self.summary_url else {
            debug!("No summary endpoint configured");
            return Ok(());
        };

        let response = self.client.post(url).json(summary).send().await?;
        if !response.status().is_success() {
            return Err(UploadError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

pub(crate) enum Command {
    Upload(EvidenceItem),
    Flush(oneshot::Sender<usize>),
    Summary(SessionSummary, oneshot::Sender<Result<(), UploadError>>),
}

/// Handle to the upload worker
#[derive(Clone)]
pub struct UploadQueue {
    tx: mpsc::Sender<Command>,
    course_id: u64,
    summary_deadline: Duration,
    enqueued: Arc<AtomicU64>,
}

impl UploadQueue {
    /// Spawn the worker on the current runtime
    pub fn spawn(config: UploaderConfig, transport: Arc<dyn Transport>) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let queue = Self {
            tx,
            course_id: config.course_id,
            summary_deadline: Duration::from_millis(config.summary_deadline_ms),
            enqueued: Arc::new(AtomicU64::new(0)),
        };

        let worker = UploadWorker {
            transport,
            backlog: VecDeque::new(),
            config,
        };
        tokio::spawn(worker.run(rx));
        queue
    }

    #[cfg(test)]
    pub(crate) fn detached(config: &UploaderConfig) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let queue = Self {
            tx,
            course_id: config.course_id,
            summary_deadline: Duration::from_millis(config.summary_deadline_ms),
            enqueued: Arc::new(AtomicU64::new(0)),
        };
        (queue, rx)
    }

    /// Hand off evidence. Never blocks; drops (and logs) if the worker is gone
    /// or saturated.
    pub fn enqueue(&self, item: EvidenceItem) {
        let reason = item.reason_label.clone();
        match self.tx.try_send(Command::Upload(item)) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("proctor_evidence_enqueued_total").increment(1);
                debug!("Evidence enqueued for course {}: {}", self.course_id, reason);
            }
            Err(e) => {
                metrics::counter!("proctor_uploads_failed_total").increment(1);
                warn!("Evidence dropped ({}): {}", reason, e);
            }
        }
    }

    /// Items accepted by [`UploadQueue::enqueue`] so far
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Retry the backlog now. Returns the number of batches still pending.
    pub async fn flush(&self) -> Result<usize, UploadError> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Command::Flush(done))
            .await
            .map_err(|_| UploadError::QueueClosed)?;
        wait.await.map_err(|_| UploadError::QueueClosed)
    }

    /// Post the session summary, giving up after the summary deadline
    pub async fn send_summary(&self, summary: SessionSummary) -> Result<(), UploadError> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Command::Summary(summary, done))
            .await
            .map_err(|_| UploadError::QueueClosed)?;

        match tokio::time::timeout(self.summary_deadline, wait).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(UploadError::QueueClosed),
            Err(_) => Err(UploadError::Transport("summary deadline exceeded".to_string())),
        }
    }
}

struct UploadWorker {
    transport: Arc<dyn Transport>,
    backlog: VecDeque<UploadRequest>,
    config: UploaderConfig,
}

impl UploadWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut retry = tokio::time::interval(Duration::from_millis(self.config.retry_interval_ms.max(1)));
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        retry.tick().await;

        info!("Upload worker started for {}", self.config.upload_url);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Upload(item)) => {
                        let request = self.request_for(&item);
                        if self.deliver(request).await {
                            self.drain_backlog().await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        self.drain_backlog().await;
                        let _ = done.send(self.backlog.len());
                    }
                    Some(Command::Summary(summary, done)) => {
                        let result = self.transport.send_summary(&summary).await;
                        if let Err(e) = &result {
                            warn!("Session summary not delivered: {}", e);
                        }
                        let _ = done.send(result);
                    }
                    None => break,
                },
                _ = retry.tick() => {
                    if !self.backlog.is_empty() {
                        self.drain_backlog().await;
                    }
                }
            }
        }

        if !self.backlog.is_empty() {
            warn!("Upload worker stopping with {} batches undelivered", self.backlog.len());
        }
    }

    fn request_for(&self, item: &EvidenceItem) -> UploadRequest {
        UploadRequest {
            course_id: self.config.course_id,
            session_token: self.config.session_token.clone(),
            batch: vec![EvidenceEntry::from(item)],
        }
    }

    /// Send one batch. Retryable failures go to the backlog.
    async fn deliver(&mut self, request: UploadRequest) -> bool {
        match self.transport.send(&request).await {
            Ok(response) => {
                if !response.success {
                    // Policy rejection: logged, never retried or escalated
                    warn!("Evidence rejected by server: {:?}", response.errors);
                } else if !response.errors.is_empty() {
                    warn!("Evidence uploaded with errors: {:?}", response.errors);
                } else {
                    info!("Evidence uploaded ({} items)", response.uploaded);
                }
                true
            }
            Err(e) if e.is_retryable() => {
                metrics::counter!("proctor_uploads_failed_total").increment(1);
                warn!("Evidence upload failed, queued for retry: {}", e);
                self.push_backlog(request);
                false
            }
            Err(e) => {
                metrics::counter!("proctor_uploads_failed_total").increment(1);
                error!("Evidence upload failed permanently: {}", e);
                false
            }
        }
    }

    fn push_backlog(&mut self, request: UploadRequest) {
        if self.backlog.len() >= self.config.backlog_limit {
            self.backlog.pop_front();
            warn!("Retry backlog full, dropped oldest batch");
        }
        if self.config.backlog_limit > 0 {
            self.backlog.push_back(request);
        }
    }

    async fn drain_backlog(&mut self) {
        while let Some(request) = self.backlog.pop_front() {
            match self.transport.send(&request).await {
                Ok(_) => debug!("Retried batch delivered, {} left", self.backlog.len()),
                Err(e) if e.is_retryable() => {
                    debug!("Retry failed, keeping backlog: {}", e);
                    self.backlog.push_front(request);
                    break;
                }
                Err(e) => error!("Dropping batch after permanent failure: {}", e),
            }
        }
    }
}
