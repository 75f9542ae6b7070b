//! Published per-camera state

use image::RgbImage;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest AI analysis state for one camera
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionStatus {
    /// Detection could not run (open failure, missing model, bad frame)
    Unavailable { reason: String },
    /// Detection not applicable for this camera
    Skipped,
    /// Detection ran on the latest processed frame
    Evaluated { person_visible: bool },
}

impl DetectionStatus {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn person_visible(&self) -> Option<bool> {
        match self {
            Self::Evaluated { person_visible } => Some(*person_visible),
            _ => None,
        }
    }

    pub fn error_reason(&self) -> Option<&str> {
        match self {
            Self::Unavailable { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Per-camera publication slots
///
/// Written only by the owning worker, read by any number of concurrent
/// readers. Frame and status use separate locks so a slow reader never
/// blocks the writer; readers may observe the previous iteration's pair
/// but never a half-written value.
pub struct StreamSlots {
    frame: RwLock<Option<Arc<RgbImage>>>,
    status: RwLock<DetectionStatus>,
}

impl StreamSlots {
    pub fn new() -> Self {
        Self {
            frame: RwLock::new(None),
            status: RwLock::new(DetectionStatus::Skipped),
        }
    }

    /// Overwrite both slots, frame first
    pub async fn publish(&self, frame: Option<Arc<RgbImage>>, status: DetectionStatus) {
        {
            let mut slot = self.frame.write().await;
            *slot = frame;
        }
        let mut slot = self.status.write().await;
        *slot = status;
    }

    /// Clear the frame slot so readers see the stream as gone
    pub async fn clear_frame(&self) {
        let mut slot = self.frame.write().await;
        *slot = None;
    }

    pub async fn latest_frame(&self) -> Option<Arc<RgbImage>> {
        self.frame.read().await.clone()
    }

    pub async fn status(&self) -> DetectionStatus {
        self.status.read().await.clone()
    }
}

impl Default for StreamSlots {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry table entry for one active camera
pub(crate) struct StreamEntry {
    /// Generation id of the worker owning this entry
    pub worker_id: u64,
    /// Worker loop run flag, cleared by `stop`
    pub running: Arc<RwLock<bool>>,
    /// Publication slots shared with readers
    pub slots: Arc<StreamSlots>,
}
