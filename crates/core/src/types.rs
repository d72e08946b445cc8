//! Gemeinsame Identifikationstypen fuer Proxvoice
//!
//! Newtype-Pattern, damit Peer-Schluessel und Stream-IDs nicht
//! verwechselt werden koennen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaker Schluessel eines entfernten Teilnehmers (Stream-Key des Peers)
///
/// Bleibt fuer die gesamte Lebensdauer einer Session unveraendert und dient
/// als Korrelationsschluessel gegenueber dem Peer-Manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerKey(pub String);

impl PeerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Gibt den Schluessel als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl std::fmt::Display for PeerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

/// Eindeutige ID eines aufgeloesten Media-Streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub Uuid);

impl StreamId {
    /// Erstellt eine neue zufaellige StreamId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream:{}", self.0)
    }
}
