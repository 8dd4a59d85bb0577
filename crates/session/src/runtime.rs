//! Sampling loop, intent dispatch and watchdog
//!
//! Wraps an [`ExamSessionController`] in tokio tasks. The loop runs on a
//! free-running render tick and gates classification to the configured
//! frame interval; the watchdog restarts it when ticks stop.

use crate::config::LoopTiming;
use crate::controller::{ExamSessionController, HudSnapshot, SessionPhase};
use crate::error::{EnvironmentError, SessionError};
use crate::intent::Intent;
use crate::precheck::SystemSample;
use evidence::{EvidenceCollector, FrameTap};
use perception::{Camera, CameraConfig, LandmarkModel, PerceptionAdapter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Receives presentation intents.
///
/// Capture intents are handled by the runtime before they reach the sink.
pub trait IntentSink: Send + Sync {
    fn apply(&self, intent: &Intent);
}

struct Shared<C, M> {
    controller: Mutex<ExamSessionController>,
    camera: Mutex<C>,
    adapter: Mutex<PerceptionAdapter<M>>,
    sink: Arc<dyn IntentSink>,
    collector: Option<EvidenceCollector>,
    tap: Option<FrameTap>,
    hud: watch::Sender<HudSnapshot>,
    timing: LoopTiming,
    epoch: Instant,
    last_tick_ms: AtomicU64,
    restarts: AtomicU64,
    stopped: AtomicBool,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl<C, M> Shared<C, M>
where
    C: Camera + 'static,
    M: LandmarkModel + 'static,
{
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn dispatch(&self, intents: &[Intent]) {
        for intent in intents {
            match intent {
                Intent::CaptureClip { reason } => {
                    if let Some(collector) = &self.collector {
                        collector.spawn_clip(reason.clone());
                    }
                }
                Intent::CaptureStill { reason } => {
                    if let Some(collector) = &self.collector {
                        collector.spawn_still(reason.clone());
                    }
                }
                Intent::StopMonitoring => {
                    self.stopped.store(true, Ordering::SeqCst);
                }
                _ => {}
            }
            self.sink.apply(intent);
        }
    }

    async fn publish_snapshot(&self) {
        let snapshot = self.controller.lock().await.snapshot();
        self.hud.send_replace(snapshot);
    }

    /// Sample, classify and dispatch one frame
    async fn step(&self, now_ms: u64) {
        let frame = match self.camera.lock().await.grab() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Frame grab failed: {}", e);
                return;
            }
        };
        if let Some(tap) = &self.tap {
            tap.publish(frame.clone());
        }

        // Model errors skip the frame; they never count as a missing face
        let detection = match self.adapter.lock().await.detect(&frame, now_ms) {
            Ok(detection) => detection,
            Err(e) => {
                debug!("Skipping frame {}: {}", frame.sequence, e);
                metrics::counter!("proctor_frames_skipped_total").increment(1);
                return;
            }
        };
        metrics::counter!("proctor_frames_total").increment(1);

        let intents = self.controller.lock().await.on_frame(&detection, now_ms);
        self.dispatch(&intents);
        self.publish_snapshot().await;
    }
}

async fn sampling_loop<C, M>(shared: Arc<Shared<C, M>>)
where
    C: Camera + 'static,
    M: LandmarkModel + 'static,
{
    let mut tick = tokio::time::interval(Duration::from_millis(shared.timing.render_tick_ms.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_sample_ms: Option<u64> = None;

    loop {
        tick.tick().await;
        if shared.stopped.load(Ordering::SeqCst) {
            debug!("Sampling loop exiting");
            break;
        }

        let now_ms = shared.now_ms();
        shared.last_tick_ms.store(now_ms, Ordering::SeqCst);

        if let Some(last) = last_sample_ms {
            if now_ms.saturating_sub(last) < shared.timing.frame_interval_ms {
                continue;
            }
        }
        last_sample_ms = Some(now_ms);
        shared.step(now_ms).await;
    }
}

/// Restarts the sampling loop when it dies or stops ticking.
///
/// A loop stuck awaiting a lock or the frame gate is aborted and replaced.
/// `grab` and `detect_for_video` are synchronous: a call that never returns
/// keeps its worker thread and never reaches an await point, so aborting
/// cannot reclaim it. Camera and model implementations must bound their own
/// call time.
async fn watchdog<C, M>(shared: Arc<Shared<C, M>>)
where
    C: Camera + 'static,
    M: LandmarkModel + 'static,
{
    let mut tick = tokio::time::interval(Duration::from_millis(shared.timing.watchdog_interval_ms.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tick.tick().await;
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }

        let now_ms = shared.now_ms();
        let stale_ms = now_ms.saturating_sub(shared.last_tick_ms.load(Ordering::SeqCst));
        let mut task = shared.loop_task.lock().await;
        let finished = task.as_ref().map(|h| h.is_finished()).unwrap_or(true);

        if stale_ms > shared.timing.watchdog_stale_ms || finished {
            warn!("Detection loop stalled ({}ms since last tick), restarting", stale_ms);
            metrics::counter!("proctor_loop_restarts_total").increment(1);
            shared.restarts.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = task.take() {
                handle.abort();
            }
            shared.last_tick_ms.store(now_ms, Ordering::SeqCst);
            *task = Some(tokio::spawn(sampling_loop(shared.clone())));
        }
    }
}

/// Runs one exam session on the tokio runtime
pub struct SessionRuntime<C, M> {
    shared: Arc<Shared<C, M>>,
    hud: watch::Receiver<HudSnapshot>,
    watchdog: Option<JoinHandle<()>>,
}

impl<C, M> SessionRuntime<C, M>
where
    C: Camera + 'static,
    M: LandmarkModel + 'static,
{
    pub fn new(controller: ExamSessionController, camera: C, model: M, sink: Arc<dyn IntentSink>) -> Self {
        Self::build(controller, camera, model, sink, None, None)
    }

    /// Runtime that also feeds a frame tap and captures evidence
    pub fn with_evidence(
        controller: ExamSessionController,
        camera: C,
        model: M,
        sink: Arc<dyn IntentSink>,
        collector: EvidenceCollector,
        tap: FrameTap,
    ) -> Self {
        Self::build(controller, camera, model, sink, Some(collector), Some(tap))
    }

    fn build(
        controller: ExamSessionController,
        camera: C,
        model: M,
        sink: Arc<dyn IntentSink>,
        collector: Option<EvidenceCollector>,
        tap: Option<FrameTap>,
    ) -> Self {
        let timing = controller.policy().timing.clone();
        let (hud_tx, hud) = watch::channel(controller.snapshot());
        let shared = Arc::new(Shared {
            controller: Mutex::new(controller),
            camera: Mutex::new(camera),
            adapter: Mutex::new(PerceptionAdapter::new(model)),
            sink,
            collector,
            tap,
            hud: hud_tx,
            timing,
            epoch: Instant::now(),
            last_tick_ms: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            loop_task: Mutex::new(None),
        });
        Self {
            shared,
            hud,
            watchdog: None,
        }
    }

    /// Live HUD state
    pub fn hud(&self) -> watch::Receiver<HudSnapshot> {
        self.hud.clone()
    }

    pub async fn snapshot(&self) -> HudSnapshot {
        self.shared.controller.lock().await.snapshot()
    }

    /// Sampling loops replaced by the watchdog so far
    pub fn loop_restarts(&self) -> u64 {
        self.shared.restarts.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Run the gate and start the loop.
    ///
    /// Order: system check, camera, ban check, environment scan, loop.
    /// Environment errors are shown through the sink and returned; the
    /// caller retries with [`SessionRuntime::retry`].
    pub async fn start(&mut self, camera_config: &CameraConfig, sample: &SystemSample) -> Result<(), SessionError> {
        let phase = self.shared.controller.lock().await.phase();
        if phase == SessionPhase::PreCheck {
            self.system_check(sample).await?;
        }

        if let Err(e) = self.shared.camera.lock().await.open(camera_config) {
            error!("Camera start failed: {}", e);
            let err = EnvironmentError::from(e);
            self.shared.sink.apply(&Intent::ShowEnvironmentError(err.clone()));
            return Err(err.into());
        }

        let (intents, phase, now_ms) = {
            let mut controller = self.shared.controller.lock().await;
            let mut intents = controller.begin();
            let now_ms = self.shared.now_ms();
            intents.extend(controller.start_scan(now_ms));
            (intents, controller.phase(), now_ms)
        };
        self.shared.dispatch(&intents);
        self.shared.publish_snapshot().await;

        if phase == SessionPhase::Banned {
            let reason = self.snapshot().await.ban_reason.unwrap_or_default();
            return Err(SessionError::Banned(reason));
        }

        self.shared.last_tick_ms.store(now_ms, Ordering::SeqCst);
        *self.shared.loop_task.lock().await = Some(tokio::spawn(sampling_loop(self.shared.clone())));
        self.watchdog = Some(tokio::spawn(watchdog(self.shared.clone())));
        info!("Session runtime started in phase {}", phase);
        Ok(())
    }

    /// Manual retry after a failed pre-check or scan
    pub async fn retry(&mut self, camera_config: &CameraConfig, sample: &SystemSample) -> Result<(), SessionError> {
        if self.watchdog.is_none() {
            return self.start(camera_config, sample).await;
        }

        self.shared.controller.lock().await.retry_precheck();
        self.system_check(sample).await?;
        let intents = {
            let now_ms = self.shared.now_ms();
            self.shared.controller.lock().await.start_scan(now_ms)
        };
        self.shared.dispatch(&intents);
        Ok(())
    }

    /// Operator override
    pub async fn force_strict_mode(&self) {
        let intents = self.shared.controller.lock().await.force_strict_mode();
        self.shared.dispatch(&intents);
        self.shared.publish_snapshot().await;
    }

    /// Stop both tasks and return the final HUD state
    pub async fn shutdown(&mut self) -> HudSnapshot {
        self.shared.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
        if let Some(handle) = self.shared.loop_task.lock().await.take() {
            handle.abort();
        }
        info!("Session runtime stopped");
        self.snapshot().await
    }

    async fn system_check(&self, sample: &SystemSample) -> Result<(), SessionError> {
        let result = self.shared.controller.lock().await.run_system_check(sample);
        match result {
            Ok(report) => {
                for issue in &report.issues {
                    warn!("System check: {}", issue);
                }
                info!("System check: {}", report.summary);
                Ok(())
            }
            Err(err) => {
                self.shared.sink.apply(&Intent::ShowEnvironmentError(err.clone()));
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use perception::{CameraError, FaceLandmarks, Landmark, PerceptionError, SyntheticCamera, VideoFrame};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;
    use strike_ledger::{KeyValueStore, MemoryStore, StrikeLedger};

    #[derive(Default)]
    struct RecordingSink {
        intents: StdMutex<Vec<Intent>>,
    }

    impl RecordingSink {
        fn count<F: Fn(&Intent) -> bool>(&self, f: F) -> usize {
            self.intents.lock().unwrap().iter().filter(|i| f(i)).count()
        }
    }

    impl IntentSink for RecordingSink {
        fn apply(&self, intent: &Intent) {
            self.intents.lock().unwrap().push(intent.clone());
        }
    }

    fn face(x: f32) -> Vec<FaceLandmarks> {
        vec![FaceLandmarks {
            points: vec![Landmark::default(), Landmark { x, y: 0.5, z: 0.0 }],
            blendshapes: Vec::new(),
        }]
    }

    fn verified_controller() -> ExamSessionController {
        let store = Arc::new(MemoryStore::new());
        store.set("verified_42", "true").unwrap();
        let policy = PolicyConfig::immediate();
        let ledger = StrikeLedger::load(store, 42, policy.ledger.clone());
        ExamSessionController::new(policy, ledger)
    }

    fn camera() -> SyntheticCamera {
        SyntheticCamera::new(|| 0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_samples_at_frame_interval() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let model = perception::from_fn(move |_: &VideoFrame, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(face(0.5))
        });
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = SessionRuntime::new(verified_controller(), camera(), model, sink.clone());

        runtime.start(&CameraConfig::default(), &SystemSample::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        let sampled = calls.load(Ordering::SeqCst);
        assert!((9..=11).contains(&sampled), "sampled {} frames", sampled);
        assert_eq!(sink.count(|i| matches!(i, Intent::SessionStarted)), 1);
        assert_eq!(runtime.hud().borrow().phase, SessionPhase::Monitoring);
        runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_face_reaches_lockdown() {
        let present = Arc::new(AtomicBool::new(true));
        let flag = present.clone();
        let model = perception::from_fn(move |_: &VideoFrame, _| {
            Ok(if flag.load(Ordering::SeqCst) { face(0.5) } else { Vec::new() })
        });
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = SessionRuntime::new(verified_controller(), camera(), model, sink.clone());
        runtime.start(&CameraConfig::default(), &SystemSample::default()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        present.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        assert_eq!(sink.count(|i| matches!(i, Intent::ShowLockdown { .. })), 1);
        let hud = runtime.shutdown().await;
        assert_eq!(hud.phase, SessionPhase::Lockdown);
        assert_eq!(hud.strikes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_errors_skip_frames() {
        let model = perception::from_fn(|_: &VideoFrame, _| Err(PerceptionError::Inference("busy".into())));
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = SessionRuntime::new(verified_controller(), camera(), model, sink.clone());
        runtime.start(&CameraConfig::default(), &SystemSample::default()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        let hud = runtime.shutdown().await;
        assert_eq!(hud.phase, SessionPhase::AwaitingFace);
        assert_eq!(hud.level_percent, 0.0);
        assert_eq!(sink.count(|i| matches!(i, Intent::StrikeRecorded { .. })), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_restarts_dead_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let model = perception::from_fn(move |_: &VideoFrame, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 3 {
                panic!("model crashed");
            }
            Ok(face(0.5))
        });
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = SessionRuntime::new(verified_controller(), camera(), model, sink.clone());
        runtime.start(&CameraConfig::default(), &SystemSample::default()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert!(calls.load(Ordering::SeqCst) > 10);
        runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_replaces_stalled_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let model = perception::from_fn(move |_: &VideoFrame, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(face(0.5))
        });
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = SessionRuntime::new(verified_controller(), camera(), model, sink.clone());
        runtime.start(&CameraConfig::default(), &SystemSample::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runtime.loop_restarts(), 0);

        // Loop parks on the controller lock and stops ticking
        {
            let _held = runtime.shared.controller.lock().await;
            tokio::time::sleep(Duration::from_millis(5_000)).await;
        }
        assert!(runtime.loop_restarts() >= 1);

        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(calls.load(Ordering::SeqCst) >= before + 5);
        runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_banned_learner_never_starts_loop() {
        let store = Arc::new(MemoryStore::new());
        store.set("banned_42", "true").unwrap();
        store.set("banned_42_reason", "Disqualified").unwrap();
        let policy = PolicyConfig::immediate();
        let ledger = StrikeLedger::load(store, 42, policy.ledger.clone());
        let controller = ExamSessionController::new(policy, ledger);

        let sink = Arc::new(RecordingSink::default());
        let model = perception::from_fn(|_: &VideoFrame, _| Ok(face(0.5)));
        let mut runtime = SessionRuntime::new(controller, camera(), model, sink.clone());

        let err = runtime.start(&CameraConfig::default(), &SystemSample::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::Banned(reason) if reason == "Disqualified"));
        assert_eq!(sink.count(|i| matches!(i, Intent::ShowBan { .. })), 1);
        assert!(runtime.is_stopped());
    }

    struct BrokenCamera;

    impl Camera for BrokenCamera {
        fn open(&mut self, _: &CameraConfig) -> Result<(), CameraError> {
            Err(CameraError::InUse)
        }
        fn grab(&mut self) -> Result<VideoFrame, CameraError> {
            Err(CameraError::NotInitialized)
        }
        fn is_streaming(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_camera_failure_shows_environment_error() {
        let sink = Arc::new(RecordingSink::default());
        let model = perception::from_fn(|_: &VideoFrame, _| Ok(Vec::new()));
        let mut runtime = SessionRuntime::new(verified_controller(), BrokenCamera, model, sink.clone());

        let err = runtime.start(&CameraConfig::default(), &SystemSample::default()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Environment(EnvironmentError::CameraInUse)
        ));
        assert_eq!(sink.count(|i| matches!(i, Intent::ShowEnvironmentError(_))), 1);
    }
}
