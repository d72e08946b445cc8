//! proxvoice-core – Gemeinsame Typen und Ereignisse
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die vom
//! Audio-Crate und vom Client gemeinsam genutzt werden.

pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::{PeerLocation, VoiceEvent};
pub use types::{PeerKey, StreamId};
