//! Shared capture pipeline fanned out to viewer subscriptions.
//!
//! At most one capture session runs at a time. The first viewer starts it,
//! later viewers join it, and the session stops and releases the camera as
//! soon as the last viewer is gone. Each viewer drains its own bounded queue;
//! a full queue drops the part for that viewer only.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::JoinHandle,
};

use actix_web::web::Bytes;
use anyhow::{Context, Result, bail};
use ml_core::DetectionModel;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use video_ingest::{CameraOpener, CaptureError};

use crate::vision::{
    data::DetectionStateStore,
    processing::{FrameOutcome, FrameProcessor},
    telemetry,
};

/// Detection model shared by successive capture sessions.
pub type SharedModel = Arc<Mutex<Box<dyn DetectionModel>>>;

#[derive(Clone, Copy, Debug)]
pub struct HubSettings {
    pub viewer_queue: usize,
    pub jpeg_quality: u8,
    pub verbose: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            viewer_queue: 4,
            jpeg_quality: 85,
            verbose: false,
        }
    }
}

/// Cloneable handle on the shared pipeline.
#[derive(Clone)]
pub struct StreamHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    opener: Arc<dyn CameraOpener>,
    model: SharedModel,
    processor: FrameProcessor,
    viewer_queue: usize,
    state: Mutex<HubState>,
    next_viewer_id: AtomicU64,
    next_session_id: AtomicU64,
    shut_down: AtomicBool,
}

#[derive(Default)]
struct HubState {
    session: Option<ActiveSession>,
    /// Thread of the most recent session; the next session joins it before
    /// opening the camera so the device is never held twice.
    last_thread: Option<JoinHandle<()>>,
}

struct ActiveSession {
    id: u64,
    cancel: Arc<AtomicBool>,
    viewers: Vec<Viewer>,
}

struct Viewer {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

/// One viewer's stream of multipart parts. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Bytes>,
    hub: Arc<HubInner>,
}

impl Subscription {
    /// Next encoded part, or `None` once the session has terminated.
    pub async fn next_part(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove_viewer(self.id);
    }
}

impl StreamHub {
    pub fn new(
        opener: Arc<dyn CameraOpener>,
        model: SharedModel,
        store: DetectionStateStore,
        settings: HubSettings,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                opener,
                model,
                processor: FrameProcessor::new(store, settings.jpeg_quality, settings.verbose),
                viewer_queue: settings.viewer_queue.max(1),
                state: Mutex::new(HubState::default()),
                next_viewer_id: AtomicU64::new(1),
                next_session_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn store(&self) -> &DetectionStateStore {
        self.inner.processor.store()
    }

    /// Register a viewer, starting a capture session if none is running.
    pub fn subscribe(&self) -> Result<Subscription> {
        let mut state = self.inner.lock_state();
        // Checked under the lock so a concurrent `shutdown` either sees the
        // new session or is seen here.
        if self.inner.shut_down.load(Ordering::SeqCst) {
            bail!("stream hub is shut down");
        }

        let (tx, rx) = mpsc::channel(self.inner.viewer_queue);
        let id = self.inner.next_viewer_id.fetch_add(1, Ordering::Relaxed);

        match state.session.as_mut() {
            Some(session) => {
                session.viewers.push(Viewer { id, tx });
                debug!(viewer = id, session = session.id, "viewer joined running session");
            }
            None => {
                let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
                let cancel = Arc::new(AtomicBool::new(false));
                let previous = state.last_thread.take();
                let inner = self.inner.clone();
                let thread_cancel = cancel.clone();
                let handle = telemetry::spawn_thread(format!("vision-capture-{session_id}"), move || {
                    inner.run_session(session_id, thread_cancel, previous)
                })
                .context("Failed to spawn capture thread")?;
                state.session = Some(ActiveSession {
                    id: session_id,
                    cancel,
                    viewers: vec![Viewer { id, tx }],
                });
                state.last_thread = Some(handle);
                debug!(viewer = id, session = session_id, "viewer started capture session");
            }
        }
        state.record_viewer_gauge();
        drop(state);

        Ok(Subscription {
            id,
            rx,
            hub: self.inner.clone(),
        })
    }

    /// Number of viewers attached to the running session.
    pub fn viewer_count(&self) -> usize {
        self.inner
            .lock_state()
            .session
            .as_ref()
            .map_or(0, |session| session.viewers.len())
    }

    /// Cancel the running session, end every subscription, and wait for the
    /// camera to be released.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let handle = {
            let mut state = self.inner.lock_state();
            if let Some(session) = state.session.take() {
                session.cancel.store(true, Ordering::SeqCst);
            }
            state.record_viewer_gauge();
            state.last_thread.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("capture thread panicked during shutdown");
            }
        }
    }
}

impl HubState {
    fn record_viewer_gauge(&self) {
        let viewers = self.session.as_ref().map_or(0, |s| s.viewers.len());
        metrics::gauge!("vision_viewers").set(viewers as f64);
    }
}

impl HubInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_viewer(&self, viewer_id: u64) {
        let mut state = self.lock_state();
        let Some(session) = state.session.as_mut() else {
            return;
        };
        session.viewers.retain(|viewer| viewer.id != viewer_id);
        if session.viewers.is_empty() {
            debug!(session = session.id, "last viewer left; cancelling capture session");
            session.cancel.store(true, Ordering::SeqCst);
            state.session = None;
        }
        state.record_viewer_gauge();
    }

    /// Hand `part` to every viewer of `session_id`. Returns false when the
    /// session has no audience left and should stop.
    fn broadcast(&self, session_id: u64, part: Bytes) -> bool {
        let mut state = self.lock_state();
        let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
            return false;
        };

        session.viewers.retain(|viewer| match viewer.tx.try_send(part.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                metrics::counter!("vision_viewer_dropped_parts_total").increment(1);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(viewer = viewer.id, "viewer disconnected");
                false
            }
        });

        let alive = !session.viewers.is_empty();
        if !alive {
            state.session = None;
        }
        state.record_viewer_gauge();
        alive
    }

    /// Drop the viewers of `session_id` so their streams end.
    fn finish_session(&self, session_id: u64) {
        let mut state = self.lock_state();
        if state.session.as_ref().is_some_and(|s| s.id == session_id) {
            state.session = None;
        }
        state.record_viewer_gauge();
    }

    fn run_session(
        self: Arc<Self>,
        session_id: u64,
        cancel: Arc<AtomicBool>,
        previous: Option<JoinHandle<()>>,
    ) {
        if let Some(previous) = previous {
            if previous.join().is_err() {
                warn!("previous capture thread panicked");
            }
        }

        let source = self.opener.describe();
        let session_span = tracing::info_span!("vision.session", session = session_id, source = %source);
        let _session_guard = session_span.enter();

        if cancel.load(Ordering::SeqCst) || self.shut_down.load(Ordering::SeqCst) {
            self.finish_session(session_id);
            return;
        }

        let mut camera = match self.opener.open() {
            Ok(camera) => camera,
            Err(err) => {
                error!("Could not open {source}: {err}");
                metrics::counter!("vision_camera_open_failures_total").increment(1);
                self.finish_session(session_id);
                return;
            }
        };
        info!("capture session started on {source}");

        let mut frame_number: u64 = 0;
        while !cancel.load(Ordering::Relaxed) && !self.shut_down.load(Ordering::Relaxed) {
            let frame = match camera.read() {
                Ok(frame) => frame,
                Err(CaptureError::EndOfStream { .. }) => {
                    info!("{source} reached end of stream");
                    break;
                }
                Err(err) => {
                    error!("Failed to grab frame: {err}");
                    break;
                }
            };
            frame_number = frame_number.wrapping_add(1);

            let outcome = {
                let _frame_guard = tracing::info_span!(
                    "frame",
                    frame = frame_number,
                    captured_ms = frame.timestamp_ms
                )
                .entered();
                let mut model = match self.model.lock() {
                    Ok(model) => model,
                    Err(_) => {
                        error!("detection model lock poisoned; stopping session");
                        break;
                    }
                };
                self.processor.process(&mut **model, &frame, frame_number)
            };

            match outcome {
                FrameOutcome::Emitted(part) => {
                    if !self.broadcast(session_id, part) {
                        debug!("no viewers remain; stopping capture");
                        break;
                    }
                }
                FrameOutcome::Skipped(reason) => {
                    debug!("frame #{frame_number} skipped ({})", reason.label());
                }
            }
        }

        camera.release();
        drop(camera);
        self.finish_session(session_id);
        info!("capture session ended after {frame_number} frame(s); camera released");
    }
}
