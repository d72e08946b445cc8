//! Lautstaerke-Berechnung fuer Peer-Streams
//!
//! Die Prozentangabe des Benutzers wird linear auf den Gain abgebildet und
//! mit einem festen Boost multipliziert. Geclamped wird hier nicht, das ist
//! Sache des Aufrufers.

/// Fester Verstaerkungsfaktor auf den prozentualen Gain (fuer alle Sessions gleich)
pub const VOLUME_BOOST: f32 = 1.2;

/// Effektiver Gain fuer eine Lautstaerke in Prozent: `(percent / 100) * 1.2`
pub fn effective_gain(percent: u8) -> f32 {
    (percent as f32 / 100.0) * VOLUME_BOOST
}
