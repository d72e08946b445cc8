//! proxvoice-audio – Raeumliche Voice-Streams pro Peer
//!
//! Lebenszyklus eines eingehenden Peer-Streams im Proximity-Voice-Chat:
//! - Stream beim Peer-Manager anfordern (`StreamRequestBroker`)
//! - Audio-Graph aufbauen: direkt (Stereo) oder raeumlich (HRTF-Panner)
//! - Lautstaerke und Position live nachfuehren
//! - Sprech-Erkennung an die UI weiterreichen
//! - Sauberer Abbau beim Stoppen
//!
//! Die Host-Audio-Engine ist ueber die Traits in [`graph`] angebunden,
//! [`headless`] liefert eine In-Memory-Implementierung ohne Geraet.

pub mod broker;
pub mod config;
pub mod detector;
pub mod error;
pub mod graph;
pub mod headless;
pub mod position;
pub mod registry;
pub mod session;
pub mod stream;
pub mod surround;
pub mod ui;
pub mod volume;

// Bequeme Re-Exporte der wichtigsten Typen
pub use broker::{LoopbackBroker, PendingBroker, StreamRequestBroker};
pub use config::{DetektorEinstellungen, VoiceEinstellungen};
pub use detector::{
    ActivityDetector, ActivityDetectorFactory, LevelDetectorFactory, SpeakingEvent,
};
pub use error::{AudioError, AudioResult, RequestError};
pub use graph::{
    AudioContext, AudioGraph, AudioGraphBuilder, GraphNodes, NodeId, PannerConfig,
};
pub use headless::{HeadlessContext, HeadlessEvent};
pub use position::SpatialPosition;
pub use registry::VoicePeerRegistry;
pub use session::{SessionCapabilities, SessionState, VoiceStreamSession};
pub use stream::MediaStream;
pub use surround::SurroundSwitch;
pub use ui::{LoggingUiFactory, PeerUiFactory, TalkingIndicator};
pub use volume::{effective_gain, VOLUME_BOOST};
