//! Headless Audio-Kontext
//!
//! In-Memory-Implementierung der Host-Engine ohne Ausgabegeraet. Haelt
//! Knoten, Parameter und Verbindungen fest, sodass Topologie und Gain-Werte
//! von aussen abgefragt werden koennen. Wird vom Client als Backend und von
//! den Tests als Pruefstand genutzt.
//!
//! Knoten und Elemente leben so lange wie ihr Handle: wird ein Handle
//! verworfen, verschwinden der Knoten und alle seine Verbindungen bzw. der
//! Element-Eintrag. Ein langlebiger Client waechst dadurch nicht mit jedem
//! Abonnieren/Verwerfen.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use proxvoice_core::StreamId;

use crate::error::{AudioError, AudioResult};
use crate::graph::{
    AudioContext, AudioNode, GainStage, NodeId, PannerConfig, SpatialSink, StreamElement,
};
use crate::position::SpatialPosition;
use crate::stream::MediaStream;

/// Art eines Knotens im Headless-Graphen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Destination,
    Source,
    Gain,
    Panner,
}

#[derive(Debug, Clone)]
enum NodeState {
    Destination,
    Source,
    Gain(f32),
    Panner {
        config: PannerConfig,
        position: Option<SpatialPosition>,
    },
}

impl NodeState {
    fn kind(&self) -> NodeKind {
        match self {
            Self::Destination => NodeKind::Destination,
            Self::Source => NodeKind::Source,
            Self::Gain(_) => NodeKind::Gain,
            Self::Panner { .. } => NodeKind::Panner,
        }
    }
}

/// Protokollierte Aenderung (nur mit `HeadlessContext::with_journal`)
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessEvent {
    GainSet { node: NodeId, value: f32 },
    NodeReleased(NodeId),
    ElementPaused(StreamId),
    SourceDetached(StreamId),
    ElementReleased(StreamId),
}

/// Zustand eines Wiedergabe-Elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementState {
    pub playing: bool,
    pub muted: bool,
    pub source_attached: bool,
}

#[derive(Debug)]
struct Inner {
    next_id: u64,
    nodes: HashMap<NodeId, NodeState>,
    edges: Vec<(NodeId, NodeId)>,
    elements: HashMap<StreamId, ElementState>,
    destination: NodeId,
    journal: Option<Vec<HeadlessEvent>>,
}

impl Inner {
    fn add(&mut self, state: NodeState) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, state);
        id
    }

    /// Entfernt einen Knoten samt ein- und ausgehender Verbindungen
    fn release(&mut self, id: NodeId) {
        if self.nodes.remove(&id).is_some() {
            self.edges.retain(|(von, nach)| *von != id && *nach != id);
            self.record(HeadlessEvent::NodeReleased(id));
        }
    }

    fn record(&mut self, event: HeadlessEvent) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(event);
        }
    }
}

/// Audio-Kontext ohne Geraet (clonebar, alle Clones teilen den Graphen)
#[derive(Debug, Clone)]
pub struct HeadlessContext {
    inner: Arc<Mutex<Inner>>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::aufbauen(None)
    }

    /// Kontext, der jede Gain-, Element- und Freigabe-Aenderung protokolliert
    pub fn with_journal() -> Self {
        Self::aufbauen(Some(Vec::new()))
    }

    fn aufbauen(journal: Option<Vec<HeadlessEvent>>) -> Self {
        let mut inner = Inner {
            next_id: 0,
            nodes: HashMap::new(),
            edges: Vec::new(),
            elements: HashMap::new(),
            destination: NodeId(0),
            journal,
        };
        inner.destination = inner.add(NodeState::Destination);
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Bisher protokollierte Aenderungen (leer ohne Journal)
    pub fn journal(&self) -> Vec<HeadlessEvent> {
        self.inner.lock().journal.clone().unwrap_or_default()
    }

    /// Anzahl der lebenden Wiedergabe-Elemente
    pub fn element_count(&self) -> usize {
        self.inner.lock().elements.len()
    }

    /// Anzahl aller Knoten inklusive Destination
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Anzahl der Knoten einer Art
    pub fn count(&self, kind: NodeKind) -> usize {
        self.inner
            .lock()
            .nodes
            .values()
            .filter(|n| n.kind() == kind)
            .count()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.inner.lock().nodes.get(&id).map(NodeState::kind)
    }

    pub fn gain(&self, id: NodeId) -> Option<f32> {
        match self.inner.lock().nodes.get(&id) {
            Some(NodeState::Gain(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn panner_config(&self, id: NodeId) -> Option<PannerConfig> {
        match self.inner.lock().nodes.get(&id) {
            Some(NodeState::Panner { config, .. }) => Some(*config),
            _ => None,
        }
    }

    /// Letzte gesetzte Position eines Panners (None = nie gesetzt)
    pub fn panner_position(&self, id: NodeId) -> Option<SpatialPosition> {
        match self.inner.lock().nodes.get(&id) {
            Some(NodeState::Panner { position, .. }) => *position,
            _ => None,
        }
    }

    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.inner.lock().edges.clone()
    }

    /// Folgt den Verbindungen ab `start` bis zu einem Knoten ohne Ausgang
    pub fn chain_from(&self, start: NodeId) -> Vec<NodeKind> {
        let inner = self.inner.lock();
        let mut kette = Vec::new();
        let mut aktuell = Some(start);
        while let Some(id) = aktuell {
            let Some(node) = inner.nodes.get(&id) else {
                break;
            };
            kette.push(node.kind());
            // Zyklen sind in der Kette nicht vorgesehen
            if kette.len() > inner.nodes.len() {
                break;
            }
            aktuell = inner
                .edges
                .iter()
                .find(|(von, _)| *von == id)
                .map(|(_, nach)| *nach);
        }
        kette
    }

    pub fn element(&self, stream: StreamId) -> Option<ElementState> {
        self.inner.lock().elements.get(&stream).cloned()
    }
}

impl Default for HeadlessContext {
    fn default() -> Self {
        Self::new()
    }
}

struct HeadlessNode {
    id: NodeId,
    inner: Arc<Mutex<Inner>>,
}

impl AudioNode for HeadlessNode {
    fn id(&self) -> NodeId {
        self.id
    }
}

impl Drop for HeadlessNode {
    fn drop(&mut self) {
        self.inner.lock().release(self.id);
    }
}

struct HeadlessGain {
    id: NodeId,
    inner: Arc<Mutex<Inner>>,
}

impl AudioNode for HeadlessGain {
    fn id(&self) -> NodeId {
        self.id
    }
}

impl GainStage for HeadlessGain {
    fn set_gain(&mut self, value: f32) {
        let mut inner = self.inner.lock();
        if let Some(node) = inner.nodes.get_mut(&self.id) {
            *node = NodeState::Gain(value);
            inner.record(HeadlessEvent::GainSet {
                node: self.id,
                value,
            });
        }
    }

    fn gain(&self) -> f32 {
        match self.inner.lock().nodes.get(&self.id) {
            Some(NodeState::Gain(v)) => *v,
            _ => 0.0,
        }
    }
}

impl Drop for HeadlessGain {
    fn drop(&mut self) {
        self.inner.lock().release(self.id);
    }
}

struct HeadlessPanner {
    id: NodeId,
    inner: Arc<Mutex<Inner>>,
}

impl AudioNode for HeadlessPanner {
    fn id(&self) -> NodeId {
        self.id
    }
}

impl SpatialSink for HeadlessPanner {
    fn set_position(&mut self, x: f64, y: f64, z: f64) {
        if let Some(NodeState::Panner { position, .. }) = self.inner.lock().nodes.get_mut(&self.id)
        {
            *position = Some(SpatialPosition::new(x, y, z));
        }
    }
}

impl Drop for HeadlessPanner {
    fn drop(&mut self) {
        self.inner.lock().release(self.id);
    }
}

struct HeadlessElement {
    stream: StreamId,
    inner: Arc<Mutex<Inner>>,
}

impl HeadlessElement {
    fn update(&self, f: impl FnOnce(&mut ElementState)) {
        if let Some(state) = self.inner.lock().elements.get_mut(&self.stream) {
            f(state);
        }
    }
}

impl StreamElement for HeadlessElement {
    fn play(&mut self) {
        self.update(|e| e.playing = true);
    }

    fn pause(&mut self) {
        self.update(|e| e.playing = false);
        self.inner
            .lock()
            .record(HeadlessEvent::ElementPaused(self.stream));
    }

    fn set_muted(&mut self, muted: bool) {
        self.update(|e| e.muted = muted);
    }

    fn detach_source(&mut self) {
        self.update(|e| e.source_attached = false);
        self.inner
            .lock()
            .record(HeadlessEvent::SourceDetached(self.stream));
    }
}

impl Drop for HeadlessElement {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.elements.remove(&self.stream).is_some() {
            inner.record(HeadlessEvent::ElementReleased(self.stream));
        }
    }
}

impl AudioContext for HeadlessContext {
    fn create_gain(&self) -> Box<dyn GainStage> {
        let id = self.inner.lock().add(NodeState::Gain(1.0));
        Box::new(HeadlessGain {
            id,
            inner: Arc::clone(&self.inner),
        })
    }

    fn create_panner(&self, config: &PannerConfig) -> Box<dyn SpatialSink> {
        let id = self.inner.lock().add(NodeState::Panner {
            config: *config,
            position: None,
        });
        Box::new(HeadlessPanner {
            id,
            inner: Arc::clone(&self.inner),
        })
    }

    fn create_stream_source(&self, _stream: &MediaStream) -> AudioResult<Box<dyn AudioNode>> {
        let id = self.inner.lock().add(NodeState::Source);
        Ok(Box::new(HeadlessNode {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn create_element(&self, stream: &MediaStream) -> Box<dyn StreamElement> {
        self.inner.lock().elements.insert(
            stream.id(),
            ElementState {
                playing: false,
                muted: false,
                source_attached: true,
            },
        );
        Box::new(HeadlessElement {
            stream: stream.id(),
            inner: Arc::clone(&self.inner),
        })
    }

    fn connect(&self, from: NodeId, to: NodeId) -> AudioResult<()> {
        let mut inner = self.inner.lock();
        for id in [from, to] {
            if !inner.nodes.contains_key(&id) {
                return Err(AudioError::Verdrahtung(format!("unbekannter Knoten {id}")));
            }
        }
        if matches!(inner.nodes.get(&from), Some(NodeState::Destination)) {
            return Err(AudioError::Verdrahtung(
                "Destination hat keinen Ausgang".into(),
            ));
        }
        inner.edges.push((from, to));
        Ok(())
    }

    fn destination(&self) -> NodeId {
        self.inner.lock().destination
    }
}
