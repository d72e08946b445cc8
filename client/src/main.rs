//! Proxvoice Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und verarbeitet
//! Voice-Ereignisse von stdin bis zum Dateiende.

use anyhow::Result;
use proxvoice_client::{config::ClientConfig, HeadlessClient};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad =
        std::env::var("PROXVOICE_CONFIG").unwrap_or_else(|_| "proxvoice.toml".into());

    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        radius = config.voice.blocks_radius,
        surround = config.voice.surround,
        "Proxvoice Client wird initialisiert"
    );

    let client = HeadlessClient::neu(config);
    let statistik = client.ausfuehren(BufReader::new(tokio::io::stdin())).await?;

    tracing::info!(
        ereignisse = statistik.ereignisse,
        ungueltig = statistik.ungueltig,
        fehlgeschlagen = statistik.fehlgeschlagen,
        "Client beendet"
    );
    Ok(())
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format.
///
/// `PV_LOG_LEVEL` ueberschreibt das Level aus der Konfiguration.
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("PV_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
