//! VoiceStreamSession – Lebenszyklus eines eingehenden Peer-Streams
//!
//! ```text
//! Idle --start()--> Requesting --Stream--> Attached --stop()--> Stopped
//!                        |
//!                        +--Ablehnung--> Failed --stop()--> Stopped
//! ```
//!
//! Eine Session gehoert genau einem Peer und besitzt ihren Graphen, ihr
//! Wiedergabe-Element und ihren Detektor exklusiv. Der einzige
//! Wartepunkt ist die Stream-Anfrage beim Broker. Der Zustand liegt hinter
//! einem Mutex, damit `stop()` waehrend einer laufenden Anfrage aufgerufen
//! werden kann. Nach dem Warten wird der Zustand erneut geprueft, ein
//! verspaeteter Stream baut nach `stop()` keinen Graphen mehr.

use std::sync::Arc;

use parking_lot::Mutex;
use proxvoice_core::PeerKey;
use tracing::{debug, info, warn};

use crate::broker::StreamRequestBroker;
use crate::detector::{ActivityDetector, ActivityDetectorFactory, SpeakingEvent};
use crate::error::{AudioError, AudioResult};
use crate::graph::{AudioContext, AudioGraph, AudioGraphBuilder, GraphNodes, StreamElement};
use crate::position::SpatialPosition;
use crate::stream::MediaStream;
use crate::surround::SurroundSwitch;
use crate::ui::TalkingIndicator;
use crate::volume::effective_gain;

/// Zustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Attached,
    /// Anfrage abgelehnt oder Graph nicht verdrahtbar – Session bleibt stumm
    Failed,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Requesting => "Requesting",
            Self::Attached => "Attached",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
        }
    }
}

/// Faehigkeiten, die eine Session von aussen bekommt
#[derive(Clone)]
pub struct SessionCapabilities {
    pub context: Arc<dyn AudioContext>,
    pub broker: Arc<dyn StreamRequestBroker>,
    pub detectors: Arc<dyn ActivityDetectorFactory>,
    /// Wird einmal beim Attach gelesen
    pub surround: SurroundSwitch,
    /// Hoerradius in Bloecken
    pub radius: f32,
}

struct Inner {
    state: SessionState,
    volume_percent: u8,
    position: Option<SpatialPosition>,
    spatial_mode: bool,
    graph: Option<AudioGraph>,
    element: Option<Box<dyn StreamElement>>,
    detector: Option<Box<dyn ActivityDetector>>,
}

/// Session fuer den eingehenden Voice-Stream eines Peers
pub struct VoiceStreamSession {
    peer: PeerKey,
    caps: SessionCapabilities,
    ui: Arc<dyn TalkingIndicator>,
    inner: Mutex<Inner>,
}

impl VoiceStreamSession {
    pub fn new(
        peer: PeerKey,
        volume_percent: u8,
        ui: Arc<dyn TalkingIndicator>,
        caps: SessionCapabilities,
    ) -> Self {
        Self {
            peer,
            caps,
            ui,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                volume_percent,
                position: None,
                spatial_mode: false,
                graph: None,
                element: None,
                detector: None,
            }),
        }
    }

    pub fn peer(&self) -> &PeerKey {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().volume_percent
    }

    pub fn position(&self) -> Option<SpatialPosition> {
        self.inner.lock().position
    }

    /// Beim Attach festgelegter Modus (false solange nicht attached)
    pub fn spatial_mode(&self) -> bool {
        self.inner.lock().spatial_mode
    }

    /// Aktueller Gain des Graphen (None ohne Graph)
    pub fn current_gain(&self) -> Option<f32> {
        self.inner.lock().graph.as_ref().map(AudioGraph::gain)
    }

    pub fn graph_nodes(&self) -> Option<GraphNodes> {
        self.inner.lock().graph.as_ref().map(AudioGraph::nodes)
    }

    pub fn has_detector(&self) -> bool {
        self.inner.lock().detector.is_some()
    }

    /// Fordert den Stream an und verdrahtet ihn, sobald er da ist.
    ///
    /// Nur aus `Idle` erlaubt. Eine Ablehnung des Brokers wird einmal
    /// geloggt und als `AnfrageAbgelehnt` zurueckgegeben, die Session bleibt
    /// dann stumm. Wurde waehrend der Anfrage `stop()` aufgerufen, wird das
    /// Ergebnis stillschweigend verworfen.
    pub async fn start(&self) -> AudioResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Idle {
                return Err(AudioError::UngueltigerZustand {
                    erwartet: SessionState::Idle.as_str(),
                    aktuell: inner.state.as_str(),
                });
            }
            inner.state = SessionState::Requesting;
        }

        debug!(peer = %self.peer, "Fordere Voice-Stream an");
        let result = self.caps.broker.request_stream(&self.peer).await;

        match result {
            Ok(stream) => {
                let surround = self.caps.surround.is_on();
                self.attach(stream, surround)
            }
            Err(grund) => {
                let mut inner = self.inner.lock();
                if inner.state != SessionState::Requesting {
                    debug!(peer = %self.peer, %grund, "Ablehnung nach stop() ignoriert");
                    return Ok(());
                }
                inner.state = SessionState::Failed;
                warn!(peer = %self.peer, %grund, "Stream fuer {} wurde abgelehnt", self.peer);
                Err(AudioError::AnfrageAbgelehnt {
                    peer: self.peer.clone(),
                    grund,
                })
            }
        }
    }

    /// Verdrahtet einen aufgeloesten Stream. `spatial` ist der Stand des
    /// Surround-Schalters im Moment der Aufloesung.
    fn attach(&self, stream: MediaStream, spatial: bool) -> AudioResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Requesting {
            debug!(
                peer = %self.peer,
                state = inner.state.as_str(),
                "Verspaeteter Stream verworfen"
            );
            return Ok(());
        }

        let mut detector = match self.caps.detectors.bind(&stream) {
            Ok(detector) => detector,
            Err(e) => {
                inner.state = SessionState::Failed;
                warn!(peer = %self.peer, "Sprech-Erkennung nicht startbar: {}", e);
                return Err(e);
            }
        };
        let ui = Arc::clone(&self.ui);
        detector.subscribe(
            SpeakingEvent::Speaking,
            Arc::new(move || ui.set_visually_talking(true)),
        );
        let ui = Arc::clone(&self.ui);
        detector.subscribe(
            SpeakingEvent::StoppedSpeaking,
            Arc::new(move || ui.set_visually_talking(false)),
        );

        let gain = effective_gain(inner.volume_percent);
        let builder = AudioGraphBuilder::new(Arc::clone(&self.caps.context), self.caps.radius);
        let mut graph = match builder.build(&stream, gain, spatial) {
            Ok(graph) => graph,
            Err(e) => {
                inner.state = SessionState::Failed;
                drop(inner);
                detector.stop();
                warn!(peer = %self.peer, "Audio-Graph fehlgeschlagen: {}", e);
                return Err(e);
            }
        };

        // Vorher gemeldete Position sofort uebernehmen
        if let (Some(pos), Some(sink)) = (inner.position, graph.spatial_sink_mut()) {
            pos.apply_to(sink);
        }

        let mut element = self.caps.context.create_element(&stream);
        element.play();
        // Hoerbar ist nur der Graph, das Element wuerde doppelt abspielen
        element.set_muted(true);

        inner.spatial_mode = spatial;
        inner.graph = Some(graph);
        inner.element = Some(element);
        inner.detector = Some(detector);
        inner.state = SessionState::Attached;

        info!(
            peer = %self.peer,
            spatial,
            gain,
            "Spiele Voice von {}", self.peer
        );
        Ok(())
    }

    /// Setzt die Lautstaerke in Prozent. Ohne Graph wird nur gespeichert.
    pub fn set_volume(&self, percent: u8) {
        let mut inner = self.inner.lock();
        inner.volume_percent = percent;
        if let Some(graph) = inner.graph.as_mut() {
            graph.set_gain(effective_gain(percent));
        }
    }

    /// Speichert eine neue Position und wendet ggf. die bisherige an.
    ///
    /// Bekannte Eigenheit: mit `apply` wird die zuvor gespeicherte Position
    /// auf den Panner gesetzt und erst danach ueberschrieben. Der Panner
    /// laeuft damit einen Aufruf hinterher.
    pub fn set_location(&self, x: f64, y: f64, z: f64, apply: bool) {
        let mut inner = self.inner.lock();
        let Inner {
            position,
            graph,
            spatial_mode,
            ..
        } = &mut *inner;

        if apply && *spatial_mode {
            if let (Some(prev), Some(sink)) =
                (position.as_ref(), graph.as_mut().and_then(|g| g.spatial_sink_mut()))
            {
                prev.apply_to(sink);
            }
        }
        *position = Some(SpatialPosition::new(x, y, z));
    }

    /// Baut Graph und Detektor ab. Mehrfach aufrufbar, aus jedem Zustand.
    ///
    /// Der Detektor wird erst nach Freigabe der Sperre gestoppt: seine
    /// Handler laufen im Detektor-Thread und duerfen die Session selbst
    /// aufrufen, auch `stop()`.
    pub fn stop(&self) {
        let detector = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Stopped {
                return;
            }

            if let Some(mut element) = inner.element.take() {
                info!(peer = %self.peer, "Schliesse Voice-Verbindung mit {}", self.peer);
                element.pause();
                if let Some(graph) = inner.graph.as_mut() {
                    graph.set_gain(0.0);
                }
                element.detach_source();
            }
            inner.graph = None;

            debug!(peer = %self.peer, von = inner.state.as_str(), "Session gestoppt");
            inner.state = SessionState::Stopped;
            inner.detector.take()
        };

        if let Some(mut detector) = detector {
            detector.stop();
        }
    }
}

impl std::fmt::Debug for VoiceStreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("VoiceStreamSession")
            .field("peer", &self.peer)
            .field("state", &inner.state)
            .field("volume_percent", &inner.volume_percent)
            .field("spatial_mode", &inner.spatial_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{LoopbackBroker, PendingBroker};
    use crate::detector::{LevelConfig, LevelDetectorFactory, SpeakingHandler};
    use crate::error::RequestError;
    use crate::headless::{HeadlessContext, HeadlessEvent, NodeKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

    /// Detektor-Attrappe: merkt sich Handler und zaehlt bind/stop
    #[derive(Default)]
    struct TestDetectors {
        bound: AtomicUsize,
        stopped: Arc<AtomicUsize>,
        handlers: Arc<Mutex<Vec<(SpeakingEvent, SpeakingHandler)>>>,
    }

    impl TestDetectors {
        fn fire(&self, event: SpeakingEvent) {
            let handlers = self.handlers.lock().clone();
            for (e, h) in handlers {
                if e == event {
                    h();
                }
            }
        }
    }

    struct TestDetector {
        stopped: Arc<AtomicUsize>,
        handlers: Arc<Mutex<Vec<(SpeakingEvent, SpeakingHandler)>>>,
    }

    impl ActivityDetector for TestDetector {
        fn subscribe(&mut self, event: SpeakingEvent, handler: SpeakingHandler) {
            self.handlers.lock().push((event, handler));
        }

        fn stop(&mut self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            self.handlers.lock().clear();
        }
    }

    impl ActivityDetectorFactory for TestDetectors {
        fn bind(&self, _stream: &MediaStream) -> AudioResult<Box<dyn ActivityDetector>> {
            self.bound.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TestDetector {
                stopped: Arc::clone(&self.stopped),
                handlers: Arc::clone(&self.handlers),
            }))
        }
    }

    #[derive(Default)]
    struct TestUi {
        calls: Mutex<Vec<bool>>,
    }

    impl TalkingIndicator for TestUi {
        fn set_visually_talking(&self, talking: bool) {
            self.calls.lock().push(talking);
        }
    }

    struct Aufbau {
        ctx: HeadlessContext,
        detectors: Arc<TestDetectors>,
        ui: Arc<TestUi>,
        surround: SurroundSwitch,
    }

    impl Aufbau {
        fn new(surround: bool) -> Self {
            Self {
                ctx: HeadlessContext::with_journal(),
                detectors: Arc::new(TestDetectors::default()),
                ui: Arc::new(TestUi::default()),
                surround: SurroundSwitch::new(surround),
            }
        }

        fn session(&self, volume: u8, broker: Arc<dyn StreamRequestBroker>) -> VoiceStreamSession {
            let caps = SessionCapabilities {
                context: Arc::new(self.ctx.clone()),
                broker,
                detectors: Arc::clone(&self.detectors) as Arc<dyn ActivityDetectorFactory>,
                surround: self.surround.clone(),
                radius: 32.0,
            };
            VoiceStreamSession::new(
                PeerKey::new("peer-1"),
                volume,
                Arc::clone(&self.ui) as Arc<dyn TalkingIndicator>,
                caps,
            )
        }

        fn loopback(&self, volume: u8) -> VoiceStreamSession {
            self.session(volume, Arc::new(LoopbackBroker::new()))
        }
    }

    #[tokio::test]
    async fn halbe_lautstaerke_ohne_surround() {
        let a = Aufbau::new(false);
        let s = a.loopback(50);
        s.start().await.unwrap();

        assert_eq!(s.state(), SessionState::Attached);
        assert!(!s.spatial_mode());
        assert!((s.current_gain().unwrap() - 0.6).abs() < 1e-6);

        let nodes = s.graph_nodes().unwrap();
        assert!(nodes.spatial.is_none());
        assert_eq!(
            a.ctx.chain_from(nodes.source),
            vec![NodeKind::Source, NodeKind::Gain, NodeKind::Destination]
        );
        assert_eq!(a.ctx.count(NodeKind::Panner), 0);
    }

    #[tokio::test]
    async fn volle_lautstaerke_mit_surround() {
        let a = Aufbau::new(true);
        let s = a.loopback(100);
        s.start().await.unwrap();

        assert!(s.spatial_mode());
        let nodes = s.graph_nodes().unwrap();
        let panner = nodes.spatial.expect("Panner erwartet");
        let cfg = a.ctx.panner_config(panner).unwrap();
        assert_eq!(cfg.max_distance, 32.0);
        assert_eq!(cfg.rolloff_factor, 1.0);
        assert_eq!(
            a.ctx.chain_from(nodes.source),
            vec![
                NodeKind::Source,
                NodeKind::Gain,
                NodeKind::Panner,
                NodeKind::Destination
            ]
        );
        assert!((s.current_gain().unwrap() - 1.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn gain_folgt_lautstaerke_fuer_alle_prozentwerte() {
        let a = Aufbau::new(false);
        let s = a.loopback(100);
        s.start().await.unwrap();
        for p in 0..=100u8 {
            s.set_volume(p);
            let erwartet = (p as f32 / 100.0) * 1.2;
            assert!(
                (s.current_gain().unwrap() - erwartet).abs() < 1e-6,
                "Gain fuer {p}%"
            );
        }
    }

    #[tokio::test]
    async fn lautstaerke_vor_attach_wird_uebernommen() {
        let a = Aufbau::new(false);
        let s = a.loopback(100);
        s.set_volume(25);
        assert_eq!(s.current_gain(), None);
        s.start().await.unwrap();
        assert!((s.current_gain().unwrap() - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn lautstaerke_waehrend_anfrage_wird_uebernommen() {
        let a = Aufbau::new(true);
        let broker = Arc::new(PendingBroker::new());
        let s = Arc::new(a.session(100, broker.clone()));
        let task = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.start().await })
        };
        while !broker.is_pending(s.peer()) {
            tokio::task::yield_now().await;
        }
        assert_eq!(s.state(), SessionState::Requesting);

        s.set_volume(25);
        assert_eq!(s.current_gain(), None);
        broker.resolve(s.peer(), Ok(MediaStream::new(s.peer().clone())));
        task.await.unwrap().unwrap();

        assert_eq!(s.volume(), 25);
        let gain = s.graph_nodes().unwrap().gain;
        assert!((a.ctx.gain(gain).unwrap() - 0.3).abs() < 1e-6);
        // Der Graph wurde direkt mit 0.3 gebaut, nicht erst mit 1.2
        assert!(a.ctx.journal().iter().all(|e| !matches!(
            e,
            HeadlessEvent::GainSet { node, value } if *node == gain && (*value - 1.2).abs() < 1e-6
        )));
    }

    #[tokio::test]
    async fn element_wird_nach_attach_gemutet() {
        let a = Aufbau::new(false);
        let broker = Arc::new(PendingBroker::new());
        let s = Arc::new(a.session(80, broker.clone()));
        let task = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.start().await })
        };
        while !broker.is_pending(s.peer()) {
            tokio::task::yield_now().await;
        }
        let stream = MediaStream::new(s.peer().clone());
        let id = stream.id();
        broker.resolve(s.peer(), Ok(stream));
        task.await.unwrap().unwrap();

        let el = a.ctx.element(id).unwrap();
        assert!(el.playing);
        assert!(el.muted);
    }

    #[tokio::test]
    async fn surround_bleibt_nach_attach_fest() {
        let a = Aufbau::new(true);
        let s = a.loopback(100);
        s.start().await.unwrap();
        a.surround.set(false);
        assert!(s.spatial_mode());
        assert!(s.graph_nodes().unwrap().spatial.is_some());

        let b = Aufbau::new(false);
        let s = b.loopback(100);
        s.start().await.unwrap();
        b.surround.set(true);
        assert!(!s.spatial_mode());
        s.set_location(1.0, 2.0, 3.0, true);
        s.set_location(4.0, 5.0, 6.0, true);
        assert_eq!(b.ctx.count(NodeKind::Panner), 0);
    }

    #[tokio::test]
    async fn surround_wird_erst_bei_aufloesung_gelesen() {
        let a = Aufbau::new(false);
        let broker = Arc::new(PendingBroker::new());
        let s = Arc::new(a.session(100, broker.clone()));
        let task = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.start().await })
        };
        while !broker.is_pending(s.peer()) {
            tokio::task::yield_now().await;
        }
        // Umschalten waehrend die Anfrage laeuft
        a.surround.set(true);
        broker.resolve(s.peer(), Ok(MediaStream::new(s.peer().clone())));
        task.await.unwrap().unwrap();
        assert!(s.spatial_mode());
    }

    #[tokio::test]
    async fn ablehnung_bleibt_stumm() {
        let a = Aufbau::new(true);
        let broker = Arc::new(LoopbackBroker::with_denied([PeerKey::new("peer-1")]));
        let s = a.session(100, broker);

        let err = s.start().await.unwrap_err();
        assert!(matches!(
            err,
            AudioError::AnfrageAbgelehnt { grund: RequestError::Denied(ref g), .. } if g == "denied"
        ));
        assert_eq!(s.state(), SessionState::Failed);
        assert!(s.graph_nodes().is_none());
        assert!(!s.has_detector());
        assert_eq!(a.detectors.bound.load(Ordering::SeqCst), 0);
        assert_eq!(a.ctx.node_count(), 1, "nur Destination");

        s.stop();
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn position_laeuft_einen_aufruf_hinterher() {
        let a = Aufbau::new(true);
        let s = a.loopback(100);
        s.start().await.unwrap();
        let panner = s.graph_nodes().unwrap().spatial.unwrap();

        s.set_location(1.0, 2.0, 3.0, true);
        assert_eq!(a.ctx.panner_position(panner), None);
        assert_eq!(s.position(), Some(SpatialPosition::new(1.0, 2.0, 3.0)));

        s.set_location(4.0, 5.0, 6.0, true);
        assert_eq!(
            a.ctx.panner_position(panner),
            Some(SpatialPosition::new(1.0, 2.0, 3.0))
        );
        assert_eq!(s.position(), Some(SpatialPosition::new(4.0, 5.0, 6.0)));
    }

    #[tokio::test]
    async fn position_ohne_apply_ist_reiner_schreibzugriff() {
        let a = Aufbau::new(true);
        let s = a.loopback(100);
        s.start().await.unwrap();
        let panner = s.graph_nodes().unwrap().spatial.unwrap();

        s.set_location(1.0, 1.0, 1.0, false);
        s.set_location(2.0, 2.0, 2.0, false);
        assert_eq!(a.ctx.panner_position(panner), None);
        assert_eq!(s.position(), Some(SpatialPosition::new(2.0, 2.0, 2.0)));
    }

    #[tokio::test]
    async fn gespeicherte_position_wird_beim_attach_gesetzt() {
        let a = Aufbau::new(true);
        let s = a.loopback(100);
        s.set_location(7.0, 8.0, 9.0, false);
        s.start().await.unwrap();
        let panner = s.graph_nodes().unwrap().spatial.unwrap();
        assert_eq!(
            a.ctx.panner_position(panner),
            Some(SpatialPosition::new(7.0, 8.0, 9.0))
        );
    }

    #[tokio::test]
    async fn stop_nach_attach_baut_ab() {
        let a = Aufbau::new(true);
        let broker = Arc::new(PendingBroker::new());
        let s = Arc::new(a.session(100, broker.clone()));
        let task = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.start().await })
        };
        while !broker.is_pending(s.peer()) {
            tokio::task::yield_now().await;
        }
        let stream = MediaStream::new(s.peer().clone());
        let id = stream.id();
        broker.resolve(s.peer(), Ok(stream));
        task.await.unwrap().unwrap();

        let nodes = s.graph_nodes().unwrap();
        s.stop();

        assert_eq!(s.state(), SessionState::Stopped);
        // Reihenfolge: pause, Gain 0, Quelle loesen, dann freigeben
        let journal = a.ctx.journal();
        let stelle = |gesucht: &HeadlessEvent| {
            journal
                .iter()
                .position(|e| e == gesucht)
                .unwrap_or_else(|| panic!("{gesucht:?} fehlt im Journal"))
        };
        let pause = stelle(&HeadlessEvent::ElementPaused(id));
        let stumm = stelle(&HeadlessEvent::GainSet {
            node: nodes.gain,
            value: 0.0,
        });
        let geloest = stelle(&HeadlessEvent::SourceDetached(id));
        let freigegeben = stelle(&HeadlessEvent::NodeReleased(nodes.gain));
        assert!(pause < stumm && stumm < geloest && geloest < freigegeben);
        stelle(&HeadlessEvent::ElementReleased(id));

        assert_eq!(a.ctx.node_count(), 1, "nur Destination");
        assert!(a.ctx.edges().is_empty());
        assert_eq!(a.ctx.element(id), None);
        assert!(s.graph_nodes().is_none());
        assert!(!s.has_detector());
        assert_eq!(a.detectors.stopped.load(Ordering::SeqCst), 1);

        // Zweiter Aufruf aendert nichts mehr
        s.stop();
        assert_eq!(a.detectors.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn stop_ohne_attach_ist_harmlos() {
        let a = Aufbau::new(true);
        let s = a.loopback(100);
        s.stop();
        s.stop();
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(s.graph_nodes().is_none());
        assert!(!s.has_detector());
        assert_eq!(a.detectors.stopped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_nur_einmal() {
        let a = Aufbau::new(false);
        let s = a.loopback(100);
        s.start().await.unwrap();
        let err = s.start().await.unwrap_err();
        assert!(matches!(err, AudioError::UngueltigerZustand { .. }));
        assert_eq!(a.ctx.count(NodeKind::Gain), 1);

        s.stop();
        assert!(s.start().await.is_err());
    }

    #[tokio::test]
    async fn verspaeteter_stream_nach_stop_wird_verworfen() {
        let a = Aufbau::new(true);
        let broker = Arc::new(PendingBroker::new());
        let s = Arc::new(a.session(100, broker.clone()));
        let task = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.start().await })
        };
        while !broker.is_pending(s.peer()) {
            tokio::task::yield_now().await;
        }
        assert_eq!(s.state(), SessionState::Requesting);

        s.stop();
        broker.resolve(s.peer(), Ok(MediaStream::new(s.peer().clone())));
        assert!(task.await.unwrap().is_ok());

        assert_eq!(s.state(), SessionState::Stopped);
        assert!(s.graph_nodes().is_none());
        assert_eq!(a.ctx.count(NodeKind::Gain), 0);
        assert_eq!(a.detectors.bound.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verspaetete_ablehnung_nach_stop_ist_kein_fehler() {
        let a = Aufbau::new(true);
        let broker = Arc::new(PendingBroker::new());
        let s = Arc::new(a.session(100, broker.clone()));
        let task = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.start().await })
        };
        while !broker.is_pending(s.peer()) {
            tokio::task::yield_now().await;
        }
        s.stop();
        broker.resolve(s.peer(), Err(RequestError::Timeout));
        assert!(task.await.unwrap().is_ok());
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn sprech_ereignisse_gehen_an_ui() {
        let a = Aufbau::new(false);
        let s = a.loopback(100);
        s.start().await.unwrap();

        a.detectors.fire(SpeakingEvent::Speaking);
        a.detectors.fire(SpeakingEvent::StoppedSpeaking);
        assert_eq!(*a.ui.calls.lock(), vec![true, false]);

        s.stop();
        a.detectors.fire(SpeakingEvent::Speaking);
        assert_eq!(a.ui.calls.lock().len(), 2, "nach stop keine Ereignisse mehr");
    }

    #[tokio::test]
    async fn lautstaerke_nach_stop_wird_nur_gespeichert() {
        let a = Aufbau::new(false);
        let s = a.loopback(100);
        s.start().await.unwrap();
        let gain = s.graph_nodes().unwrap().gain;
        s.stop();
        s.set_volume(40);
        assert_eq!(s.volume(), 40);
        assert_eq!(s.current_gain(), None);
        assert_eq!(a.ctx.gain(gain), None, "Gain-Knoten ist freigegeben");
        assert!(!a.ctx.journal().iter().any(|e| matches!(
            e,
            HeadlessEvent::GainSet { value, .. } if (*value - 0.48).abs() < 1e-6
        )));
    }

    /// Anzeige, die aus dem Detektor-Thread heraus die Session selbst bedient
    #[derive(Default)]
    struct RueckrufUi {
        session: OnceLock<Weak<VoiceStreamSession>>,
        gelesen: Mutex<Vec<u8>>,
    }

    impl TalkingIndicator for RueckrufUi {
        fn set_visually_talking(&self, talking: bool) {
            let Some(session) = self.session.get().and_then(Weak::upgrade) else {
                return;
            };
            self.gelesen.lock().push(session.volume());
            if talking {
                session.stop();
            }
        }
    }

    #[tokio::test]
    async fn ui_darf_session_aus_handler_stoppen() {
        let ctx = HeadlessContext::new();
        let broker = Arc::new(PendingBroker::new());
        let ui = Arc::new(RueckrufUi::default());
        let caps = SessionCapabilities {
            context: Arc::new(ctx.clone()),
            broker: broker.clone(),
            detectors: Arc::new(LevelDetectorFactory::new(LevelConfig::default())),
            surround: SurroundSwitch::new(false),
            radius: 32.0,
        };
        let s = Arc::new(VoiceStreamSession::new(
            PeerKey::new("rueckruf"),
            70,
            Arc::clone(&ui) as Arc<dyn TalkingIndicator>,
            caps,
        ));
        assert!(ui.session.set(Arc::downgrade(&s)).is_ok());

        let task = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.start().await })
        };
        while !broker.is_pending(s.peer()) {
            tokio::task::yield_now().await;
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        broker.resolve(s.peer(), Ok(MediaStream::with_frames(s.peer().clone(), rx)));
        task.await.unwrap().unwrap();
        assert!(s.has_detector());

        for _ in 0..3 {
            tx.send(vec![0.5f32; 480]).unwrap();
        }

        let mut gewartet = Duration::ZERO;
        while s.state() != SessionState::Stopped && gewartet < Duration::from_secs(2) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            gewartet += Duration::from_millis(10);
        }
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(!s.has_detector());
        assert_eq!(*ui.gelesen.lock(), vec![70]);
        assert_eq!(ctx.node_count(), 1);
    }
}
