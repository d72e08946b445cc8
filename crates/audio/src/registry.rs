//! Peer-Registry – alle aktiven Voice-Sessions eines Clients
//!
//! Setzt die eingehenden Voice-Ereignisse des Servers (Abonnieren,
//! Verwerfen, Positionen, Lautstaerke, Surround) auf die einzelnen Sessions
//! um. Ein fehlgeschlagener Peer beeinflusst die anderen nicht.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use proxvoice_core::{PeerKey, PeerLocation, VoiceEvent};
use tracing::{debug, info};

use crate::error::AudioResult;
use crate::session::{SessionCapabilities, SessionState, VoiceStreamSession};
use crate::ui::PeerUiFactory;

/// Verwaltet eine Session pro abonniertem Peer
pub struct VoicePeerRegistry {
    caps: SessionCapabilities,
    ui: Arc<dyn PeerUiFactory>,
    sessions: DashMap<PeerKey, Arc<VoiceStreamSession>>,
    volume: AtomicU8,
}

impl VoicePeerRegistry {
    pub fn new(caps: SessionCapabilities, ui: Arc<dyn PeerUiFactory>, volume_percent: u8) -> Self {
        Self {
            caps,
            ui,
            sessions: DashMap::new(),
            volume: AtomicU8::new(volume_percent),
        }
    }

    /// Abonniert den Stream eines Peers.
    ///
    /// Gibt `Ok(true)` zurueck wenn die Session attached ist, `Ok(false)`
    /// wenn der Peer schon abonniert war oder waehrend der Anfrage verworfen
    /// wurde. Bei Ablehnung wird die Session wieder entfernt.
    pub async fn subscribe(
        &self,
        peer: PeerKey,
        name: &str,
        location: PeerLocation,
    ) -> AudioResult<bool> {
        let session = {
            let Entry::Vacant(slot) = self.sessions.entry(peer.clone()) else {
                debug!(peer = %peer, "Peer bereits abonniert");
                return Ok(false);
            };
            let session = Arc::new(VoiceStreamSession::new(
                peer.clone(),
                self.volume(),
                self.ui.indicator(&peer, name),
                self.caps.clone(),
            ));
            session.set_location(location.x, location.y, location.z, false);
            slot.insert(Arc::clone(&session));
            session
        };

        info!(peer = %peer, name, "Peer in Hoerweite, abonniere Stream");

        match session.start().await {
            Ok(()) => Ok(session.state() == SessionState::Attached),
            Err(e) => {
                self.sessions
                    .remove_if(&peer, |_, s| Arc::ptr_eq(s, &session));
                Err(e)
            }
        }
    }

    /// Entfernt und stoppt die Session eines Peers
    pub fn drop_peer(&self, peer: &PeerKey) -> bool {
        match self.sessions.remove(peer) {
            Some((_, session)) => {
                session.stop();
                true
            }
            None => {
                debug!(peer = %peer, "Unbekannter Peer, nichts zu verwerfen");
                false
            }
        }
    }

    /// Reicht eine neue Position an die Session weiter (mit Anwenden)
    pub fn update_location(&self, peer: &PeerKey, location: PeerLocation) -> bool {
        match self.sessions.get(peer) {
            Some(session) => {
                session.set_location(location.x, location.y, location.z, true);
                true
            }
            None => false,
        }
    }

    /// Setzt die Lautstaerke fuer alle Peers (auch fuer kuenftige)
    pub fn set_volume(&self, percent: u8) {
        self.volume.store(percent, Ordering::Relaxed);
        for entry in self.sessions.iter() {
            entry.value().set_volume(percent);
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Schaltet Surround um. Laufende Sessions behalten ihren Modus.
    pub fn set_surround(&self, on: bool) {
        self.caps.surround.set(on);
    }

    /// Stoppt und entfernt alle Sessions
    pub fn stop_all(&self) {
        let peers: Vec<PeerKey> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for peer in peers {
            self.drop_peer(&peer);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, peer: &PeerKey) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn session(&self, peer: &PeerKey) -> Option<Arc<VoiceStreamSession>> {
        self.sessions.get(peer).map(|s| Arc::clone(s.value()))
    }

    /// Verarbeitet ein eingehendes Voice-Ereignis
    pub async fn handle_event(&self, event: VoiceEvent) -> AudioResult<()> {
        match event {
            VoiceEvent::Subscribe {
                peer,
                name,
                uuid,
                location,
            } => {
                debug!(peer = %peer, ?uuid, "Subscribe empfangen");
                self.subscribe(peer, &name, location).await?;
            }
            VoiceEvent::Drop { peer } => {
                self.drop_peer(&peer);
            }
            VoiceEvent::LocationUpdate { peer, location } => {
                if !self.update_location(&peer, location) {
                    debug!(peer = %peer, "Position fuer unbekannten Peer ignoriert");
                }
            }
            VoiceEvent::VolumeChanged { percent } => self.set_volume(percent),
            VoiceEvent::SurroundToggled { on } => self.set_surround(on),
        }
        Ok(())
    }
}
