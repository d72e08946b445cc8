//! 3D-Position einer Peer-Quelle

use proxvoice_core::PeerLocation;

use crate::graph::SpatialSink;

/// Koordinaten-Tripel einer raeumlichen Quelle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpatialPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SpatialPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Uebertraegt die Koordinaten auf die Positions-Parameter einer Senke
    pub fn apply_to(&self, sink: &mut dyn SpatialSink) {
        sink.set_position(self.x, self.y, self.z);
    }
}

impl From<PeerLocation> for SpatialPosition {
    fn from(loc: PeerLocation) -> Self {
        Self::new(loc.x, loc.y, loc.z)
    }
}
