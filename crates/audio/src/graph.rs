//! Audio-Graph eines Peer-Streams
//!
//! Schnittstelle zur Host-Audio-Engine (Kontext, Knoten, Ausgabe-Element)
//! und der Builder, der pro Session genau einmal die Knotenkette aufbaut:
//!
//! ```text
//! Surround aus:  Source -> Gain -> Destination
//! Surround an:   Source -> Gain -> Panner -> Destination
//! ```
//!
//! Spaetere Aenderungen (Lautstaerke, Position) veraendern nur Parameter der
//! bestehenden Knoten, der Graph wird nie neu gebaut.

use std::sync::Arc;

use tracing::debug;

use crate::error::AudioResult;
use crate::stream::MediaStream;

/// ID eines Knotens innerhalb eines Audio-Kontexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Panning-Modell des raeumlichen Knotens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanningModel {
    EqualPower,
    /// Head-Related Transfer Function
    Hrtf,
}

/// Distanzmodell des raeumlichen Knotens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceModel {
    Linear,
    Inverse,
    Exponential,
}

/// Parameter fuer einen raeumlichen Knoten (Panner)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PannerConfig {
    pub panning_model: PanningModel,
    pub distance_model: DistanceModel,
    /// Maximale hoerbare Distanz in Bloecken
    pub max_distance: f32,
    pub rolloff_factor: f32,
}

impl PannerConfig {
    /// HRTF mit linearem Abfall auf null bei `radius`
    pub fn voice(radius: f32) -> Self {
        Self {
            panning_model: PanningModel::Hrtf,
            distance_model: DistanceModel::Linear,
            max_distance: radius,
            rolloff_factor: 1.0,
        }
    }
}

/// Gemeinsame Basis aller Graph-Knoten
pub trait AudioNode: Send {
    fn id(&self) -> NodeId;
}

/// Verstaerkungsstufe
pub trait GainStage: AudioNode {
    fn set_gain(&mut self, value: f32);
    fn gain(&self) -> f32;
}

/// Raeumliche Senke – rendert das Signal als kaeme es von einem 3D-Punkt
pub trait SpatialSink: AudioNode {
    fn set_position(&mut self, x: f64, y: f64, z: f64);
}

/// Wiedergabe-Element, an das der rohe Stream gebunden ist
///
/// Das Element wird nur abgespielt damit der Stream fliesst, hoerbar ist
/// ausschliesslich der Graph. Deshalb wird es direkt nach dem Attach gemutet.
pub trait StreamElement: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn set_muted(&mut self, muted: bool);
    /// Loest `src` und `srcObject` vom Element
    fn detach_source(&mut self);
}

/// Audio-Kontext der Host-Engine
pub trait AudioContext: Send + Sync {
    fn create_gain(&self) -> Box<dyn GainStage>;
    fn create_panner(&self, config: &PannerConfig) -> Box<dyn SpatialSink>;
    fn create_stream_source(&self, stream: &MediaStream) -> AudioResult<Box<dyn AudioNode>>;
    fn create_element(&self, stream: &MediaStream) -> Box<dyn StreamElement>;
    fn connect(&self, from: NodeId, to: NodeId) -> AudioResult<()>;
    fn destination(&self) -> NodeId;
}

/// IDs der Knoten eines gebauten Graphen (fuer Diagnose und Tests)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphNodes {
    pub source: NodeId,
    pub gain: NodeId,
    pub spatial: Option<NodeId>,
}

/// Exklusiv einer Session gehoerender Knotensatz
///
/// Die Knoten gehoeren dem Graphen: wird er verworfen, gibt der Host sie
/// samt Verbindungen frei.
pub struct AudioGraph {
    source: Box<dyn AudioNode>,
    gain: Box<dyn GainStage>,
    spatial: Option<Box<dyn SpatialSink>>,
}

impl AudioGraph {
    pub fn set_gain(&mut self, value: f32) {
        self.gain.set_gain(value);
    }

    pub fn gain(&self) -> f32 {
        self.gain.gain()
    }

    pub fn spatial_sink_mut(&mut self) -> Option<&mut (dyn SpatialSink + 'static)> {
        self.spatial.as_deref_mut()
    }

    pub fn nodes(&self) -> GraphNodes {
        GraphNodes {
            source: self.source.id(),
            gain: self.gain.id(),
            spatial: self.spatial.as_ref().map(|s| s.id()),
        }
    }
}

/// Baut die Knotenkette fuer einen aufgeloesten Stream
pub struct AudioGraphBuilder {
    context: Arc<dyn AudioContext>,
    radius: f32,
}

impl AudioGraphBuilder {
    pub fn new(context: Arc<dyn AudioContext>, radius: f32) -> Self {
        Self { context, radius }
    }

    /// Erzeugt Source, Gain und optional Panner und verbindet sie
    pub fn build(&self, stream: &MediaStream, gain: f32, spatial: bool) -> AudioResult<AudioGraph> {
        let ctx = &self.context;
        let source = ctx.create_stream_source(stream)?;
        let mut gain_stage = ctx.create_gain();
        gain_stage.set_gain(gain);

        ctx.connect(source.id(), gain_stage.id())?;

        let spatial_sink = if spatial {
            let panner = ctx.create_panner(&PannerConfig::voice(self.radius));
            ctx.connect(gain_stage.id(), panner.id())?;
            ctx.connect(panner.id(), ctx.destination())?;
            Some(panner)
        } else {
            ctx.connect(gain_stage.id(), ctx.destination())?;
            None
        };

        debug!(
            peer = %stream.peer(),
            spatial,
            gain,
            "Audio-Graph verdrahtet"
        );

        Ok(AudioGraph {
            source,
            gain: gain_stage,
            spatial: spatial_sink,
        })
    }
}
