//! Voice-Einstellungen
//!
//! Werden vom Client aus der `[voice]`-Sektion der TOML-Konfiguration
//! gelesen. Alle Felder haben Standardwerte.

use serde::{Deserialize, Serialize};

use crate::detector::LevelConfig;
use crate::error::{AudioError, AudioResult};

/// Einstellungen fuer Proximity-Voice
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceEinstellungen {
    /// Hoerradius in Bloecken (maximale Distanz des Panners)
    pub blocks_radius: f32,
    /// Start-Lautstaerke neuer Peers in Prozent
    pub standard_lautstaerke: u8,
    /// Surround (raeumliches Audio) beim Start eingeschaltet
    pub surround: bool,
    /// Sprech-Erkennung
    pub detektor: DetektorEinstellungen,
}

impl Default for VoiceEinstellungen {
    fn default() -> Self {
        Self {
            blocks_radius: 32.0,
            standard_lautstaerke: 100,
            surround: true,
            detektor: DetektorEinstellungen::default(),
        }
    }
}

/// Einstellungen der Sprech-Erkennung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetektorEinstellungen {
    /// Schwelle in dBFS
    pub schwelle_db: f32,
    /// Historie in Frames
    pub historie: usize,
}

impl Default for DetektorEinstellungen {
    fn default() -> Self {
        Self {
            schwelle_db: -50.0,
            historie: 10,
        }
    }
}

impl DetektorEinstellungen {
    pub fn level_config(&self) -> LevelConfig {
        LevelConfig {
            threshold_db: self.schwelle_db,
            history: self.historie,
        }
    }
}

impl VoiceEinstellungen {
    /// Prueft die Werte auf Plausibilitaet
    pub fn validieren(&self) -> AudioResult<()> {
        if !(self.blocks_radius.is_finite() && self.blocks_radius > 0.0) {
            return Err(AudioError::Konfiguration(format!(
                "blocks_radius muss positiv sein, war {}",
                self.blocks_radius
            )));
        }
        if self.detektor.historie < 3 {
            return Err(AudioError::Konfiguration(format!(
                "detektor.historie muss mindestens 3 sein, war {}",
                self.detektor.historie
            )));
        }
        Ok(())
    }
}
