//! Sprech-Erkennung fuer Peer-Streams
//!
//! Die Session sieht vom Detektor nur zwei Uebergaenge (Sprechen beginnt,
//! Sprechen endet) und kann ihn stoppen. Wie der Detektor entscheidet,
//! bleibt hinter dem Trait verborgen.

pub mod level;

use std::sync::Arc;

use crate::error::AudioResult;
use crate::stream::MediaStream;

pub use level::{LevelActivityDetector, LevelConfig, LevelDetectorFactory, SpeakingTracker};

/// Beobachtbare Uebergaenge eines Detektors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeakingEvent {
    /// `speaking`
    Speaking,
    /// `stopped_speaking`
    StoppedSpeaking,
}

/// Callback fuer einen Uebergang
pub type SpeakingHandler = Arc<dyn Fn() + Send + Sync>;

/// An einen Stream gebundener Detektor
pub trait ActivityDetector: Send {
    /// Registriert einen Handler fuer einen Uebergang
    fn subscribe(&mut self, event: SpeakingEvent, handler: SpeakingHandler);

    /// Beendet die Erkennung. Danach werden keine Handler mehr aufgerufen.
    fn stop(&mut self);
}

/// Erzeugt pro Stream einen Detektor
pub trait ActivityDetectorFactory: Send + Sync {
    fn bind(&self, stream: &MediaStream) -> AudioResult<Box<dyn ActivityDetector>>;
}
