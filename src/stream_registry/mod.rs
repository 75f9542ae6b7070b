//! StreamRegistry - Active Worker Table
//!
//! ## Responsibilities
//!
//! - Process-wide table of stream workers keyed by camera id
//! - Start/stop arbitration with at most one live worker per camera
//! - Latest frame and AI status lookups for readers
//!
//! ## Locking discipline
//!
//! One mutex guards table insert/remove; each entry's frame/status slots
//! carry their own locks so readers and the writing worker never contend
//! on the table. Nothing does I/O while holding the table lock:
//! connection opening happens in the spawned worker, after insert.

mod types;

pub use types::{DetectionStatus, StreamSlots};
pub(crate) use types::StreamEntry;

use crate::camera_config::CameraDescriptor;
use crate::detector::Detector;
use crate::error::Result;
use crate::stream_worker::StreamWorker;
use crate::video_source::SourceOpener;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::timeout;

/// Default wait for a worker's Connecting outcome before answering the
/// start request
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Shared worker table, also held by workers for self-cleanup
pub(crate) type StreamTable = Arc<Mutex<HashMap<String, StreamEntry>>>;

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new worker was launched
    Started,
    /// A worker for this camera already exists
    AlreadyRunning,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Process-wide stream supervisor table
pub struct StreamRegistry {
    streams: StreamTable,
    opener: Arc<dyn SourceOpener>,
    detector: Arc<Detector>,
    grace_period: Duration,
    next_worker_id: AtomicU64,
}

impl StreamRegistry {
    pub fn new(opener: Arc<dyn SourceOpener>, detector: Arc<Detector>) -> Self {
        Self::with_grace_period(opener, detector, DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(
        opener: Arc<dyn SourceOpener>,
        detector: Arc<Detector>,
        grace_period: Duration,
    ) -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            opener,
            detector,
            grace_period,
            next_worker_id: AtomicU64::new(1),
        }
    }

    /// Ensure a worker exists for the camera, launching one if absent
    ///
    /// The entry is inserted (slots initialized empty) before the worker
    /// spawns, so concurrent start requests see it immediately. The call
    /// then waits up to the grace period for the Connecting outcome:
    /// an open failure inside the grace period removes the entry and
    /// returns the failure; a still-connecting worker counts as started.
    pub async fn ensure_started(&self, camera: &CameraDescriptor) -> Result<StartOutcome> {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let running = Arc::new(RwLock::new(true));
        let slots = Arc::new(StreamSlots::new());

        {
            let mut streams = self.streams.lock().await;
            if streams.contains_key(&camera.id) {
                return Ok(StartOutcome::AlreadyRunning);
            }
            streams.insert(
                camera.id.clone(),
                StreamEntry {
                    worker_id,
                    running: running.clone(),
                    slots: slots.clone(),
                },
            );
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = StreamWorker::new(
            worker_id,
            camera.clone(),
            running,
            slots,
            self.opener.clone(),
            self.detector.clone(),
            self.streams.clone(),
        );
        tokio::spawn(worker.run(ready_tx));

        match timeout(self.grace_period, ready_rx).await {
            // Source opened inside the grace period
            Ok(Ok(Ok(()))) => Ok(StartOutcome::Started),
            // Explicit open failure: the worker already removed its entry,
            // clean up again defensively in case it has not run yet
            Ok(Ok(Err(e))) => {
                remove_entry_if_current(&self.streams, &camera.id, worker_id).await;
                Err(e)
            }
            // Worker died without reporting (panic in the open path)
            Ok(Err(_)) => {
                remove_entry_if_current(&self.streams, &camera.id, worker_id).await;
                Err(crate::error::Error::Internal(format!(
                    "stream worker for {} terminated unexpectedly",
                    camera.id
                )))
            }
            // Still connecting: answer the start request, let the worker
            // settle on its own
            Err(_) => Ok(StartOutcome::Started),
        }
    }

    /// Stop the camera's worker and clear its published state
    ///
    /// Removal is immediate: new readers see "not running" without waiting
    /// for the worker task to observe its flag. Idempotent, and safe to
    /// race against worker self-termination.
    pub async fn stop(&self, camera_id: &str) -> StopOutcome {
        let entry = {
            let mut streams = self.streams.lock().await;
            streams.remove(camera_id)
        };

        match entry {
            Some(entry) => {
                {
                    let mut running = entry.running.write().await;
                    *running = false;
                }
                entry.slots.clear_frame().await;
                tracing::info!(camera_id = %camera_id, "Stream stopped");
                StopOutcome::Stopped
            }
            None => {
                tracing::debug!(camera_id = %camera_id, "Stop requested for inactive stream");
                StopOutcome::NotRunning
            }
        }
    }

    /// Latest published frame, `None` when the camera has no worker or no
    /// frame yet
    pub async fn latest_frame(&self, camera_id: &str) -> Option<Arc<RgbImage>> {
        let slots = self.entry_slots(camera_id).await?;
        slots.latest_frame().await
    }

    /// Latest AI status, `None` when the camera has no worker
    pub async fn status(&self, camera_id: &str) -> Option<DetectionStatus> {
        let slots = self.entry_slots(camera_id).await?;
        Some(slots.status().await)
    }

    /// Whether a worker entry exists for the camera
    pub async fn is_active(&self, camera_id: &str) -> bool {
        self.streams.lock().await.contains_key(camera_id)
    }

    /// Number of active worker entries
    pub async fn active_count(&self) -> usize {
        self.streams.lock().await.len()
    }

    async fn entry_slots(&self, camera_id: &str) -> Option<Arc<StreamSlots>> {
        let streams = self.streams.lock().await;
        streams.get(camera_id).map(|e| e.slots.clone())
    }
}

/// Remove the entry for `camera_id` only if it still belongs to
/// `worker_id`
///
/// Presence in the table is the single source of truth; the generation
/// check keeps a dying worker from removing a successor's entry after a
/// stop/start race.
pub(crate) async fn remove_entry_if_current(
    streams: &StreamTable,
    camera_id: &str,
    worker_id: u64,
) -> bool {
    let mut streams = streams.lock().await;
    match streams.get(camera_id) {
        Some(entry) if entry.worker_id == worker_id => {
            streams.remove(camera_id);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::ScriptedBackend;
    use crate::detector::{DetectorConfig, RawCandidate};
    use crate::video_source::testing::ScriptedOpener;

    fn camera(id: &str, url: &str, is_classroom: bool) -> CameraDescriptor {
        CameraDescriptor {
            id: id.to_string(),
            rtsp_url: url.to_string(),
            is_classroom,
            name: None,
        }
    }

    fn registry() -> StreamRegistry {
        StreamRegistry::with_grace_period(
            Arc::new(ScriptedOpener::new()),
            Arc::new(Detector::unavailable(DetectorConfig::default())),
            Duration::from_millis(500),
        )
    }

    /// Poll until `probe` returns true or the deadline passes
    async fn wait_for<F, Fut>(mut probe: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if probe().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_start_publishes_frames_and_status() {
        let registry = registry();
        let cam = camera("cam1", "test-endless", false);

        let outcome = registry.ensure_started(&cam).await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);

        // Status answers immediately, without waiting on worker I/O
        assert_eq!(registry.status("cam1").await, Some(DetectionStatus::Skipped));

        assert!(wait_for(|| async { registry.latest_frame("cam1").await.is_some() }).await);
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_start_is_noop() {
        let registry = registry();
        let cam = camera("cam1", "test-endless", false);

        assert_eq!(
            registry.ensure_started(&cam).await.unwrap(),
            StartOutcome::Started
        );
        assert_eq!(
            registry.ensure_started(&cam).await.unwrap(),
            StartOutcome::AlreadyRunning
        );
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_no_entry() {
        let registry = registry();
        let cam = camera("cam2", "test-fail", false);

        let err = registry.ensure_started(&cam).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::SourceOpen { .. }));
        assert!(!registry.is_active("cam2").await);
        assert!(registry.status("cam2").await.is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let registry = registry();
        let cam = camera("cam1", "test-endless", false);
        registry.ensure_started(&cam).await.unwrap();

        assert_eq!(registry.stop("cam1").await, StopOutcome::Stopped);
        assert_eq!(registry.stop("cam1").await, StopOutcome::NotRunning);
        assert!(registry.latest_frame("cam1").await.is_none());
    }

    #[tokio::test]
    async fn test_status_unknown_camera_is_none() {
        let registry = registry();
        assert!(registry.status("nope").await.is_none());
        assert!(registry.latest_frame("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_starts_single_worker() {
        let registry = Arc::new(registry());
        let cam = camera("cam1", "test-endless", false);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let cam = cam.clone();
            handles.push(tokio::spawn(
                async move { registry.ensure_started(&cam).await },
            ));
        }

        let mut started = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                StartOutcome::Started => started += 1,
                StartOutcome::AlreadyRunning => already += 1,
            }
        }

        assert_eq!(started, 1);
        assert_eq!(already, 7);
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_source_exhaustion_self_terminates() {
        let registry = registry();
        let cam = camera("cam1", "test-frames:3", false);
        registry.ensure_started(&cam).await.unwrap();

        // Worker reads its three frames, hits end-of-stream, removes itself
        assert!(wait_for(|| async { !registry.is_active("cam1").await }).await);
        assert!(registry.status("cam1").await.is_none());
    }

    #[tokio::test]
    async fn test_restart_after_self_termination() {
        let registry = registry();
        registry
            .ensure_started(&camera("cam1", "test-frames:2", false))
            .await
            .unwrap();
        assert!(wait_for(|| async { !registry.is_active("cam1").await }).await);

        // Same id starts cleanly again
        let outcome = registry
            .ensure_started(&camera("cam1", "test-endless", false))
            .await
            .unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert!(wait_for(|| async { registry.latest_frame("cam1").await.is_some() }).await);
    }

    #[tokio::test]
    async fn test_stop_start_race_keeps_successor() {
        let registry = Arc::new(registry());

        // Start a short-lived worker, stop it, immediately restart: the
        // dying first worker must not remove the second worker's entry.
        registry
            .ensure_started(&camera("cam1", "test-frames:1", false))
            .await
            .unwrap();
        registry.stop("cam1").await;
        registry
            .ensure_started(&camera("cam1", "test-endless", false))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(registry.is_active("cam1").await);
        assert!(wait_for(|| async { registry.latest_frame("cam1").await.is_some() }).await);
    }

    #[tokio::test]
    async fn test_classroom_without_model_degrades() {
        let registry = registry();
        let cam = camera("cam1", "test-endless", true);
        registry.ensure_started(&cam).await.unwrap();

        // Raw video flows while the status flags the missing model
        assert!(wait_for(|| async { registry.latest_frame("cam1").await.is_some() }).await);
        assert!(
            wait_for(|| async {
                registry.status("cam1").await
                    == Some(DetectionStatus::unavailable("model not loaded"))
            })
            .await
        );
    }

    #[tokio::test]
    async fn test_classroom_with_model_evaluates() {
        let backend = ScriptedBackend::person_at(0.5, 0.5, 0.9);
        let detector = Detector::with_backend(DetectorConfig::default(), Box::new(backend));
        let registry = StreamRegistry::with_grace_period(
            Arc::new(ScriptedOpener::new()),
            Arc::new(detector),
            Duration::from_millis(500),
        );

        registry
            .ensure_started(&camera("cam1", "test-endless", true))
            .await
            .unwrap();

        assert!(
            wait_for(|| async {
                registry.status("cam1").await
                    == Some(DetectionStatus::Evaluated {
                        person_visible: true,
                    })
            })
            .await
        );
        assert!(registry.latest_frame("cam1").await.is_some());
    }

    #[tokio::test]
    async fn test_no_person_candidates_evaluate_false() {
        let backend = ScriptedBackend {
            candidates: vec![RawCandidate {
                cx: 0.5,
                cy: 0.5,
                w: 0.2,
                h: 0.2,
                confidence: 0.9,
                label: "chair".to_string(),
            }],
        };
        let detector = Detector::with_backend(DetectorConfig::default(), Box::new(backend));
        let registry = StreamRegistry::with_grace_period(
            Arc::new(ScriptedOpener::new()),
            Arc::new(detector),
            Duration::from_millis(500),
        );

        registry
            .ensure_started(&camera("cam1", "test-endless", true))
            .await
            .unwrap();

        assert!(
            wait_for(|| async {
                registry.status("cam1").await
                    == Some(DetectionStatus::Evaluated {
                        person_visible: false,
                    })
            })
            .await
        );
    }
}
