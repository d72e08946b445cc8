//! Anbindung an die UI (Sprech-Anzeige pro Peer)

use std::sync::Arc;

use proxvoice_core::PeerKey;
use tracing::info;

/// Empfaengt Sprech-Zustandswechsel eines Peers
pub trait TalkingIndicator: Send + Sync {
    fn set_visually_talking(&self, talking: bool);
}

/// Erzeugt pro abonniertem Peer eine Anzeige
pub trait PeerUiFactory: Send + Sync {
    fn indicator(&self, peer: &PeerKey, name: &str) -> Arc<dyn TalkingIndicator>;
}

/// Anzeige, die Zustandswechsel nur ins Log schreibt
#[derive(Debug, Clone)]
pub struct LoggingIndicator {
    name: String,
}

impl LoggingIndicator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TalkingIndicator for LoggingIndicator {
    fn set_visually_talking(&self, talking: bool) {
        if talking {
            info!(name = %self.name, "spricht");
        } else {
            info!(name = %self.name, "spricht nicht mehr");
        }
    }
}

/// Factory fuer [`LoggingIndicator`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingUiFactory;

impl PeerUiFactory for LoggingUiFactory {
    fn indicator(&self, _peer: &PeerKey, name: &str) -> Arc<dyn TalkingIndicator> {
        Arc::new(LoggingIndicator::new(name))
    }
}
