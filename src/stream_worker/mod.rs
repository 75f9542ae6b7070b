//! StreamWorker - Per-Camera Connection Lifecycle
//!
//! ## Responsibilities
//!
//! - Open the camera's video source, loop-read frames
//! - Run detection + annotation for classroom cameras
//! - Publish the latest frame and AI status to the registry slots
//! - Detect terminal source failure and self-terminate
//! - Remove its own registry entry exactly once on exit
//!
//! ## State machine
//!
//! Connecting -> Running -> Stopped, with Running -> Failed -> Stopped on
//! irrecoverable read failure. The stop flag is checked before every
//! iteration; termination is an explicit transition, never inferred from
//! table membership.

use crate::camera_config::CameraDescriptor;
use crate::detector::{Detector, PERSON_LABEL};
use crate::error::{Error, Result};
use crate::frame_annotator;
use crate::stream_registry::{remove_entry_if_current, DetectionStatus, StreamSlots, StreamTable};
use crate::video_source::SourceOpener;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};

/// Per-iteration yield, bounds CPU without hurting throughput
const ITERATION_DELAY: Duration = Duration::from_millis(10);

/// One camera's stream supervisor
pub struct StreamWorker {
    worker_id: u64,
    camera: CameraDescriptor,
    running: Arc<RwLock<bool>>,
    slots: Arc<StreamSlots>,
    opener: Arc<dyn SourceOpener>,
    detector: Arc<Detector>,
    streams: StreamTable,
}

impl StreamWorker {
    pub(crate) fn new(
        worker_id: u64,
        camera: CameraDescriptor,
        running: Arc<RwLock<bool>>,
        slots: Arc<StreamSlots>,
        opener: Arc<dyn SourceOpener>,
        detector: Arc<Detector>,
        streams: StreamTable,
    ) -> Self {
        Self {
            worker_id,
            camera,
            running,
            slots,
            opener,
            detector,
            streams,
        }
    }

    /// Run the worker to completion
    ///
    /// `ready` reports the Connecting outcome to the caller that requested
    /// the start: `Ok` once the first frame is published (so an attached
    /// reader sees a present slot), `Err` on open failure.
    pub async fn run(self, ready: oneshot::Sender<Result<()>>) {
        tracing::info!(
            camera_id = %self.camera.id,
            url = %self.camera.rtsp_url,
            is_classroom = self.camera.is_classroom,
            "Starting stream worker"
        );
        let mut ready = Some(ready);

        // Connecting
        let mut source = match self
            .opener
            .open(&self.camera.id, &self.camera.rtsp_url)
            .await
        {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(
                    camera_id = %self.camera.id,
                    error = %e,
                    "Failed to open stream"
                );
                self.slots
                    .publish(None, DetectionStatus::unavailable("failed to open stream"))
                    .await;
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(e));
                }
                self.finish(None).await;
                return;
            }
        };

        // Running
        loop {
            if !*self.running.read().await {
                break;
            }

            match source.read_frame().await {
                Ok(Some(frame)) => {
                    self.process_frame(frame).await;
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                Ok(None) => {
                    // Failed
                    tracing::warn!(camera_id = %self.camera.id, "Stream ended");
                    self.fail(&mut ready).await;
                    break;
                }
                Err(e) => {
                    // Failed
                    tracing::warn!(
                        camera_id = %self.camera.id,
                        error = %e,
                        "Stream read failed"
                    );
                    self.fail(&mut ready).await;
                    break;
                }
            }

            tokio::time::sleep(ITERATION_DELAY).await;
        }

        // Stopped before the first frame: the start still succeeded, the
        // entry is simply gone by the time the caller looks
        if let Some(tx) = ready.take() {
            let _ = tx.send(Ok(()));
        }

        // Stopped: dropping the source releases the capture process
        self.finish(Some(source)).await;
    }

    /// Publish the terminal read-failure state
    async fn fail(&self, ready: &mut Option<oneshot::Sender<Result<()>>>) {
        self.slots
            .publish(None, DetectionStatus::unavailable("stream ended or failed"))
            .await;

        // A source that dies before its first frame fails the start request
        if let Some(tx) = ready.take() {
            let _ = tx.send(Err(Error::SourceOpen {
                camera_id: self.camera.id.clone(),
                reason: "stream ended before first frame".to_string(),
            }));
        }
    }

    /// Process one frame: detection + annotation for classroom cameras,
    /// raw passthrough otherwise
    async fn process_frame(&self, frame: RgbImage) {
        if !self.camera.is_classroom {
            self.slots
                .publish(Some(Arc::new(frame)), DetectionStatus::Skipped)
                .await;
            return;
        }

        let raw = Arc::new(frame);
        let detector = self.detector.clone();
        let input = raw.clone();

        // Inference is CPU-bound; keep it off the async worker thread
        let outcome = tokio::task::spawn_blocking(move || {
            let detections = detector.detect(&input)?;
            let annotated = frame_annotator::annotate(&input, &detections);
            let person_visible = detections.iter().any(|d| d.label == PERSON_LABEL);
            Ok::<_, Error>((annotated, person_visible))
        })
        .await;

        match outcome {
            Ok(Ok((annotated, person_visible))) => {
                self.slots
                    .publish(
                        Some(Arc::new(annotated)),
                        DetectionStatus::Evaluated { person_visible },
                    )
                    .await;
            }
            Ok(Err(Error::ModelUnavailable)) => {
                self.slots
                    .publish(Some(raw), DetectionStatus::unavailable("model not loaded"))
                    .await;
            }
            Ok(Err(e)) => {
                // A bad frame must not kill the stream: keep the raw frame
                // flowing and flag the failure
                tracing::warn!(
                    camera_id = %self.camera.id,
                    error = %e,
                    "Frame processing failed"
                );
                self.slots
                    .publish(
                        Some(raw),
                        DetectionStatus::unavailable(format!("processing error: {}", e)),
                    )
                    .await;
            }
            Err(e) => {
                tracing::warn!(
                    camera_id = %self.camera.id,
                    error = %e,
                    "Frame processing task aborted"
                );
                self.slots
                    .publish(
                        Some(raw),
                        DetectionStatus::unavailable(format!("processing error: {}", e)),
                    )
                    .await;
            }
        }
    }

    /// Terminal cleanup, runs exactly once on every exit path
    async fn finish(&self, source: Option<Box<dyn crate::video_source::VideoSource>>) {
        drop(source);

        let removed =
            remove_entry_if_current(&self.streams, &self.camera.id, self.worker_id).await;

        tracing::info!(
            camera_id = %self.camera.id,
            removed_entry = removed,
            "Stream worker stopped"
        );
    }
}
