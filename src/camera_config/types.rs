//! Camera topology types

use serde::{Deserialize, Serialize};

/// One configured video source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Unique camera id within the topology
    pub id: String,
    /// Video feed address
    pub rtsp_url: String,
    /// Whether person detection runs on this camera's frames
    #[serde(default)]
    pub is_classroom: bool,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Camera topology document root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraTopology {
    #[serde(default)]
    pub campuses: Vec<Campus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campus {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub buildings: Vec<Building>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub floors: Vec<Floor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Floor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub cameras: Vec<CameraDescriptor>,
}

impl CameraTopology {
    /// Iterate all cameras across the campus/building/floor hierarchy
    pub fn cameras(&self) -> impl Iterator<Item = &CameraDescriptor> {
        self.campuses
            .iter()
            .flat_map(|campus| &campus.buildings)
            .flat_map(|building| &building.floors)
            .flat_map(|floor| &floor.cameras)
    }

    /// Find camera details by id
    pub fn find_camera(&self, camera_id: &str) -> Option<&CameraDescriptor> {
        self.cameras().find(|c| c.id == camera_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CameraTopology {
        serde_json::from_value(serde_json::json!({
            "campuses": [{
                "id": "main",
                "buildings": [{
                    "id": "bldg-a",
                    "floors": [{
                        "id": "f1",
                        "cameras": [
                            {"id": "cam1", "rtsp_url": "rtsp://10.0.0.1/stream", "is_classroom": true},
                            {"id": "cam2", "rtsp_url": "rtsp://10.0.0.2/stream"}
                        ]
                    }]
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_find_camera() {
        let topology = sample();

        let cam = topology.find_camera("cam1").unwrap();
        assert!(cam.is_classroom);
        assert_eq!(cam.rtsp_url, "rtsp://10.0.0.1/stream");

        // is_classroom defaults to false when omitted
        let cam2 = topology.find_camera("cam2").unwrap();
        assert!(!cam2.is_classroom);

        assert!(topology.find_camera("cam9").is_none());
    }

    #[test]
    fn test_cameras_flattened() {
        let topology = sample();
        assert_eq!(topology.cameras().count(), 2);
    }
}
