use foundation::bounds::LngLat;
use serde::{Deserialize, Serialize};

/// Center, zoom, bearing and pitch of the map view.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraPose {
    pub center: LngLat,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
}

impl CameraPose {
    /// Top-down, north-up pose.
    pub fn flat(center: LngLat, zoom: f64) -> Self {
        Self {
            center,
            zoom,
            bearing: 0.0,
            pitch: 0.0,
        }
    }

    pub fn approx_eq(&self, other: &CameraPose, eps: f64) -> bool {
        self.center.approx_eq(other.center, eps)
            && (self.zoom - other.zoom).abs() <= eps
            && (self.bearing - other.bearing).abs() <= eps
            && (self.pitch - other.pitch).abs() <= eps
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        // Montreal, where the first datasets came from.
        Self::flat(LngLat::new(-73.5673, 45.5017), 10.0)
    }
}
