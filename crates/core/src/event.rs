//! Eingehende Voice-Steuerereignisse
//!
//! Der Server teilt dem Client mit, welche Peers in Hoerweite sind, wo sie
//! stehen und wann sie wieder verschwinden. Diese Ereignisse werden von der
//! Peer-Registry im Audio-Crate verarbeitet.

use crate::types::PeerKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position eines Peers in Weltkoordinaten (Bloecke)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PeerLocation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PeerLocation {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Alle Voice-Ereignisse, die den Zustand der Peer-Sessions veraendern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// Ein Peer ist in Hoerweite gekommen – Stream abonnieren
    Subscribe {
        peer: PeerKey,
        name: String,
        #[serde(default)]
        uuid: Option<Uuid>,
        location: PeerLocation,
    },
    /// Ein Peer hat die Hoerweite verlassen – Stream verwerfen
    Drop { peer: PeerKey },
    /// Neue Position eines abonnierten Peers
    LocationUpdate { peer: PeerKey, location: PeerLocation },
    /// Globale Lautstaerke fuer alle Peers (Prozent)
    VolumeChanged { percent: u8 },
    /// Surround-Schalter umgelegt (wirkt nur auf kuenftige Attaches)
    SurroundToggled { on: bool },
}

impl VoiceEvent {
    /// Gibt den betroffenen Peer zurueck, falls das Ereignis peer-bezogen ist
    pub fn peer(&self) -> Option<&PeerKey> {
        match self {
            Self::Subscribe { peer, .. }
            | Self::Drop { peer }
            | Self::LocationUpdate { peer, .. } => Some(peer),
            Self::VolumeChanged { .. } | Self::SurroundToggled { .. } => None,
        }
    }
}
