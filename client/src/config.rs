//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! lauffaehig ist.

use proxvoice_audio::VoiceEinstellungen;
use serde::{Deserialize, Serialize};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Proximity-Voice-Einstellungen
    pub voice: VoiceEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Verhalten des lokalen Brokers im Headless-Betrieb
    pub loopback: LoopbackEinstellungen,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Lokaler Broker
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoopbackEinstellungen {
    /// Peer-Schluessel, deren Stream-Anfragen abgelehnt werden
    pub abgelehnt: Vec<String>,
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Fehlt die Datei, werden Standardwerte verwendet.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config: Self = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.voice.validieren()?;
        Ok(config)
    }
}
