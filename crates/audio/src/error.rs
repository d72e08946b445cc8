//! Fehlertypen fuer das Voice-Audio-Crate

use proxvoice_core::PeerKey;
use thiserror::Error;

/// Alle moeglichen Fehler der Voice-Stream-Verwaltung
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Stream fuer {peer} abgelehnt: {grund}")]
    AnfrageAbgelehnt { peer: PeerKey, grund: RequestError },

    #[error("Ungueltiger Session-Zustand: erwartet={erwartet}, aktuell={aktuell}")]
    UngueltigerZustand {
        erwartet: &'static str,
        aktuell: &'static str,
    },

    #[error("Audio-Graph konnte nicht verdrahtet werden: {0}")]
    Verdrahtung(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Fehler, mit denen der Peer-Manager eine Stream-Anfrage ablehnen kann
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("verweigert ({0})")]
    Denied(String),

    #[error("Zeitlimit ueberschritten")]
    Timeout,

    #[error("Peer-Verbindung getrennt")]
    Disconnected,
}

impl RequestError {
    /// Gibt true zurueck wenn ein erneuter Versuch sinnvoll sein koennte
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Disconnected)
    }
}
