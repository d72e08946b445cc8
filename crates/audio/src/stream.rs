//! Opaker Handle auf einen aufgeloesten Peer-Stream

use crossbeam_channel::Receiver;
use proxvoice_core::{PeerKey, StreamId};

/// Live-Media-Stream eines entfernten Teilnehmers
///
/// Wird vom Peer-Manager geliefert. Optional haengt ein Kanal mit
/// dekodierten PCM-Frames daran, aus dem der Sprech-Detektor liest.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: StreamId,
    peer: PeerKey,
    frames: Option<Receiver<Vec<f32>>>,
}

impl MediaStream {
    /// Stream ohne Frame-Kanal (Detektor bleibt stumm)
    pub fn new(peer: PeerKey) -> Self {
        Self {
            id: StreamId::new(),
            peer,
            frames: None,
        }
    }

    /// Stream mit Frame-Kanal fuer die Sprach-Erkennung
    pub fn with_frames(peer: PeerKey, frames: Receiver<Vec<f32>>) -> Self {
        Self {
            id: StreamId::new(),
            peer,
            frames: Some(frames),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn peer(&self) -> &PeerKey {
        &self.peer
    }

    pub fn frames(&self) -> Option<&Receiver<Vec<f32>>> {
        self.frames.as_ref()
    }
}
