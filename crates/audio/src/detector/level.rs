//! Pegel-basierte Sprech-Erkennung
//!
//! Jeder Frame wird auf einen dBFS-Pegel reduziert und mit einer Schwelle
//! verglichen. Eine kurze Historie sorgt fuer schnelles Ansprechen und
//! traeges Abfallen:
//! - `Speaking`, wenn der Pegel ueber der Schwelle liegt und mindestens 2
//!   der letzten 3 Historien-Eintraege ebenfalls darueber lagen
//! - `StoppedSpeaking`, wenn der Pegel darunter liegt und die gesamte
//!   Historie still war

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::RwLock;
use proxvoice_core::PeerKey;
use tracing::{debug, error, trace};

use super::{ActivityDetector, ActivityDetectorFactory, SpeakingEvent, SpeakingHandler};
use crate::error::AudioResult;
use crate::stream::MediaStream;

/// Untergrenze fuer den Pegel (digitale Stille)
const PEGEL_MINIMUM_DB: f32 = -200.0;

/// Konfiguration der Pegel-Erkennung
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelConfig {
    /// Schwelle in dBFS
    pub threshold_db: f32,
    /// Laenge der Historie in Frames
    pub history: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            threshold_db: -50.0,
            history: 10,
        }
    }
}

/// Berechnet den RMS-Pegel eines Frames in dBFS
pub fn level_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return PEGEL_MINIMUM_DB;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_sq / samples.len() as f32).sqrt();
    if rms <= 0.0 {
        return PEGEL_MINIMUM_DB;
    }
    (20.0 * rms.log10()).max(PEGEL_MINIMUM_DB)
}

/// Zustandsautomat der Erkennung (ohne Threads, frame-getrieben)
#[derive(Debug, Clone)]
pub struct SpeakingTracker {
    config: LevelConfig,
    history: VecDeque<bool>,
    speaking: bool,
}

impl SpeakingTracker {
    pub fn new(config: LevelConfig) -> Self {
        let laenge = config.history.max(3);
        Self {
            config,
            history: std::iter::repeat(false).take(laenge).collect(),
            speaking: false,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn push_frame(&mut self, samples: &[f32]) -> Option<SpeakingEvent> {
        self.push_level(level_db(samples))
    }

    /// Verarbeitet einen Pegel und gibt einen Uebergang zurueck, falls einer stattfand
    pub fn push_level(&mut self, level: f32) -> Option<SpeakingEvent> {
        let laut = level > self.config.threshold_db;
        let mut event = None;

        if laut && !self.speaking {
            let kuerzlich = self.history.iter().rev().take(3).filter(|&&h| h).count();
            if kuerzlich >= 2 {
                self.speaking = true;
                event = Some(SpeakingEvent::Speaking);
            }
        } else if level < self.config.threshold_db && self.speaking {
            if self.history.iter().all(|&h| !h) {
                self.speaking = false;
                event = Some(SpeakingEvent::StoppedSpeaking);
            }
        }

        self.history.pop_front();
        self.history.push_back(laut);
        event
    }
}

#[derive(Default)]
struct Handlers {
    speaking: Vec<SpeakingHandler>,
    stopped: Vec<SpeakingHandler>,
}

impl Handlers {
    fn snapshot(&self, event: SpeakingEvent) -> Vec<SpeakingHandler> {
        match event {
            SpeakingEvent::Speaking => self.speaking.clone(),
            SpeakingEvent::StoppedSpeaking => self.stopped.clone(),
        }
    }
}

/// Detektor, der die Frames eines Streams in einem eigenen Thread auswertet
///
/// Streams ohne Frame-Kanal bekommen keinen Thread, der Detektor feuert dann nie.
pub struct LevelActivityDetector {
    handlers: Arc<RwLock<Handlers>>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl LevelActivityDetector {
    /// Startet den Auswerte-Thread. Scheitert nur, wenn das System keinen
    /// Thread mehr hergibt (`AudioError::Io`).
    pub fn spawn(
        peer: &PeerKey,
        frames: Option<Receiver<Vec<f32>>>,
        config: LevelConfig,
    ) -> AudioResult<Self> {
        let handlers = Arc::new(RwLock::new(Handlers::default()));

        let Some(frames) = frames else {
            debug!(peer = %peer, "Stream ohne Frames, Sprech-Erkennung inaktiv");
            return Ok(Self {
                handlers,
                stop_tx: None,
                worker: None,
            });
        };

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handlers_clone = Arc::clone(&handlers);
        let peer_clone = peer.clone();

        let worker = std::thread::Builder::new()
            .name(format!("proxvoice-vad-{}", peer.as_str()))
            .spawn(move || {
                detector_thread(peer_clone, frames, stop_rx, handlers_clone, config);
            })
            .map_err(|e| {
                error!(peer = %peer, "Detektor-Thread konnte nicht gestartet werden: {}", e);
                e
            })?;

        Ok(Self {
            handlers,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Laeuft der Auswerte-Thread noch?
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl ActivityDetector for LevelActivityDetector {
    fn subscribe(&mut self, event: SpeakingEvent, handler: SpeakingHandler) {
        let mut handlers = self.handlers.write();
        match event {
            SpeakingEvent::Speaking => handlers.speaking.push(handler),
            SpeakingEvent::StoppedSpeaking => handlers.stopped.push(handler),
        }
    }

    fn stop(&mut self) {
        // Kanal schliessen beendet den select im Thread
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            // Aus einem Handler heraus gestoppt: der Thread endet von selbst
            if worker.thread().id() == std::thread::current().id() {
                trace!("Detektor aus eigenem Thread gestoppt");
            } else if worker.join().is_err() {
                error!("Detektor-Thread ist abgestuerzt");
            }
        }
        let mut handlers = self.handlers.write();
        handlers.speaking.clear();
        handlers.stopped.clear();
    }
}

impl Drop for LevelActivityDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn detector_thread(
    peer: PeerKey,
    frames: Receiver<Vec<f32>>,
    stop_rx: Receiver<()>,
    handlers: Arc<RwLock<Handlers>>,
    config: LevelConfig,
) {
    let mut tracker = SpeakingTracker::new(config);
    debug!(peer = %peer, "Sprech-Erkennung gestartet");

    loop {
        select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => {
                    if let Some(event) = tracker.push_frame(&frame) {
                        trace!(peer = %peer, ?event, "Sprech-Uebergang");
                        // Ohne gehaltene Sperre aufrufen, Handler duerfen stoppen
                        let liste = handlers.read().snapshot(event);
                        for handler in liste {
                            handler();
                        }
                    }
                }
                Err(_) => break,
            },
            recv(stop_rx) -> _ => break,
        }
    }

    debug!(peer = %peer, "Sprech-Erkennung beendet");
}

/// Factory fuer pegel-basierte Detektoren
#[derive(Debug, Clone, Default)]
pub struct LevelDetectorFactory {
    config: LevelConfig,
}

impl LevelDetectorFactory {
    pub fn new(config: LevelConfig) -> Self {
        Self { config }
    }
}

impl ActivityDetectorFactory for LevelDetectorFactory {
    fn bind(&self, stream: &MediaStream) -> AudioResult<Box<dyn ActivityDetector>> {
        let detector =
            LevelActivityDetector::spawn(stream.peer(), stream.frames().cloned(), self.config)?;
        Ok(Box::new(detector))
    }
}
