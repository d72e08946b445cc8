//! proxvoice-client – Bibliotheks-Root
//!
//! Headless-Client: liest Voice-Ereignisse als JSON-Zeilen und bildet sie
//! auf eine Peer-Registry mit In-Memory-Audio-Kontext ab.

pub mod config;

use std::sync::Arc;

use anyhow::Result;
use config::ClientConfig;
use proxvoice_audio::{
    HeadlessContext, LevelDetectorFactory, LoggingUiFactory, LoopbackBroker,
    SessionCapabilities, SurroundSwitch, VoicePeerRegistry,
};
use proxvoice_core::{PeerKey, VoiceEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Zaehler fuer einen Durchlauf
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistik {
    /// Erfolgreich verarbeitete Ereignisse
    pub ereignisse: u64,
    /// Nicht lesbare Zeilen
    pub ungueltig: u64,
    /// Ereignisse, deren Verarbeitung fehlschlug (z.B. abgelehnte Streams)
    pub fehlgeschlagen: u64,
}

/// Haelt Registry und Headless-Kontext zusammen
pub struct HeadlessClient {
    pub config: ClientConfig,
    context: HeadlessContext,
    registry: VoicePeerRegistry,
}

impl HeadlessClient {
    /// Erstellt einen neuen Client aus der gegebenen Konfiguration
    pub fn neu(config: ClientConfig) -> Self {
        let context = HeadlessContext::new();
        let broker = LoopbackBroker::with_denied(
            config.loopback.abgelehnt.iter().map(|k| PeerKey::new(k.as_str())),
        );
        let caps = SessionCapabilities {
            context: Arc::new(context.clone()),
            broker: Arc::new(broker),
            detectors: Arc::new(LevelDetectorFactory::new(
                config.voice.detektor.level_config(),
            )),
            surround: SurroundSwitch::new(config.voice.surround),
            radius: config.voice.blocks_radius,
        };
        let registry = VoicePeerRegistry::new(
            caps,
            Arc::new(LoggingUiFactory),
            config.voice.standard_lautstaerke,
        );
        Self {
            config,
            context,
            registry,
        }
    }

    pub fn registry(&self) -> &VoicePeerRegistry {
        &self.registry
    }

    pub fn context(&self) -> &HeadlessContext {
        &self.context
    }

    /// Verarbeitet Ereignisse bis zum Ende der Eingabe und stoppt danach alle Sessions
    pub async fn ausfuehren<R>(&self, eingabe: R) -> Result<Statistik>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut statistik = Statistik::default();
        let mut zeilen = eingabe.lines();

        while let Some(zeile) = zeilen.next_line().await? {
            let zeile = zeile.trim();
            if zeile.is_empty() || zeile.starts_with('#') {
                continue;
            }

            let event: VoiceEvent = match serde_json::from_str(zeile) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(zeile, "Ungueltiges Ereignis: {}", e);
                    statistik.ungueltig += 1;
                    continue;
                }
            };

            match self.registry.handle_event(event).await {
                Ok(()) => statistik.ereignisse += 1,
                Err(e) => {
                    // Bereits von der Session geloggt
                    tracing::debug!("Ereignis fehlgeschlagen: {}", e);
                    statistik.fehlgeschlagen += 1;
                }
            }
        }

        tracing::info!(
            peers = self.registry.len(),
            ereignisse = statistik.ereignisse,
            "Eingabe beendet, stoppe alle Sessions"
        );
        self.registry.stop_all();
        Ok(statistik)
    }
}
