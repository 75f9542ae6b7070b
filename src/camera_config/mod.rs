//! CameraConfig - Camera Topology Store
//!
//! ## Responsibilities
//!
//! - Load the topology document (campuses/buildings/floors/cameras)
//! - Camera lookup by id for stream start requests
//! - Raw document passthrough for the frontend

mod types;

pub use types::{Building, CameraDescriptor, CameraTopology, Campus, Floor};

use crate::error::{Error, Result};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;

/// Topology store backed by a JSON file
///
/// The document is cached in memory and re-read from disk on `reload`.
/// Lookups always consult the latest loaded document, so a stream request
/// works even if the frontend never fetched `/cameras` first.
pub struct TopologyStore {
    path: PathBuf,
    cached: RwLock<CameraTopology>,
}

impl TopologyStore {
    /// Create store and load the initial document
    ///
    /// A missing or invalid file is not fatal at startup: the store begins
    /// empty and the next `reload` picks up the file once it appears.
    pub async fn open(path: PathBuf) -> Self {
        let store = Self {
            path,
            cached: RwLock::new(CameraTopology::default()),
        };

        match store.reload().await {
            Ok(_) => {
                tracing::info!(
                    path = %store.path.display(),
                    cameras = store.camera_count().await,
                    "Camera topology loaded"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %store.path.display(),
                    error = %e,
                    "Camera topology not loaded at startup"
                );
            }
        }

        store
    }

    /// Re-read the document from disk and refresh the cache
    ///
    /// Returns the raw document so passthrough responses keep fields the
    /// typed model does not know about.
    pub async fn reload(&self) -> Result<serde_json::Value> {
        let raw = fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!(
                    "Configuration file not found at {}",
                    self.path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let document: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Configuration file is not valid JSON: {}", e)))?;
        let topology: CameraTopology = serde_json::from_value(document.clone())
            .map_err(|e| Error::Config(format!("Configuration file has unexpected shape: {}", e)))?;

        {
            let mut cached = self.cached.write().await;
            *cached = topology;
        }

        Ok(document)
    }

    /// Find camera details by id in the cached document
    pub async fn find_camera(&self, camera_id: &str) -> Option<CameraDescriptor> {
        let cached = self.cached.read().await;
        cached.find_camera(camera_id).cloned()
    }

    /// Number of cameras in the cached document
    pub async fn camera_count(&self) -> usize {
        let cached = self.cached.read().await;
        cached.cameras().count()
    }
}
