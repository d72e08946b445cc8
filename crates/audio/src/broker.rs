//! Stream-Anfragen an den Peer-Manager
//!
//! Der Peer-Manager (Transport, Signaling) ist nicht Teil dieses Crates.
//! Hier steht nur der Vertrag: eine Anfrage pro Peer-Schluessel, die genau
//! einmal mit einem Stream oder einem Fehler endet.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use proxvoice_core::PeerKey;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::stream::MediaStream;

/// Loest einen Peer-Schluessel asynchron in einen Live-Stream auf
#[async_trait]
pub trait StreamRequestBroker: Send + Sync {
    async fn request_stream(&self, peer: &PeerKey) -> Result<MediaStream, RequestError>;
}

/// Broker der sofort lokal antwortet (Headless-Betrieb)
///
/// Liefert fuer jeden Peer einen frischen Stream ohne Frames, ausser der
/// Peer steht auf der Sperrliste.
#[derive(Debug, Default)]
pub struct LoopbackBroker {
    denied: Mutex<HashSet<PeerKey>>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_denied(peers: impl IntoIterator<Item = PeerKey>) -> Self {
        Self {
            denied: Mutex::new(peers.into_iter().collect()),
        }
    }
}

#[async_trait]
impl StreamRequestBroker for LoopbackBroker {
    async fn request_stream(&self, peer: &PeerKey) -> Result<MediaStream, RequestError> {
        if self.denied.lock().contains(peer) {
            return Err(RequestError::Denied("denied".into()));
        }
        Ok(MediaStream::new(peer.clone()))
    }
}

/// Broker mit offenen Anfragen, die von aussen beantwortet werden
///
/// Jede Anfrage wartet, bis `resolve` fuer denselben Peer aufgerufen wird.
/// Wird der Broker (oder die Anfrage) vorher verworfen, endet sie mit
/// `RequestError::Disconnected`.
#[derive(Debug, Default)]
pub struct PendingBroker {
    pending: Mutex<HashMap<PeerKey, oneshot::Sender<Result<MediaStream, RequestError>>>>,
}

impl PendingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Beantwortet die offene Anfrage fuer `peer`. Gibt false zurueck, wenn
    /// keine Anfrage offen war oder der Anfragende nicht mehr wartet.
    pub fn resolve(&self, peer: &PeerKey, result: Result<MediaStream, RequestError>) -> bool {
        let Some(tx) = self.pending.lock().remove(peer) else {
            warn!(peer = %peer, "Keine offene Stream-Anfrage");
            return false;
        };
        tx.send(result).is_ok()
    }

    pub fn is_pending(&self, peer: &PeerKey) -> bool {
        self.pending.lock().contains_key(peer)
    }
}

#[async_trait]
impl StreamRequestBroker for PendingBroker {
    async fn request_stream(&self, peer: &PeerKey) -> Result<MediaStream, RequestError> {
        let (tx, rx) = oneshot::channel();
        if self.pending.lock().insert(peer.clone(), tx).is_some() {
            debug!(peer = %peer, "Vorherige Stream-Anfrage ersetzt");
        }
        rx.await.unwrap_or(Err(RequestError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn loopback_liefert_stream() {
        let broker = LoopbackBroker::new();
        let stream = broker.request_stream(&PeerKey::new("a")).await.unwrap();
        assert_eq!(stream.peer(), &PeerKey::new("a"));
        assert!(stream.frames().is_none());
    }

    #[tokio::test]
    async fn loopback_sperrliste() {
        let broker = LoopbackBroker::with_denied([PeerKey::new("boese")]);
        let res = broker.request_stream(&PeerKey::new("boese")).await;
        assert_eq!(res.unwrap_err(), RequestError::Denied("denied".into()));
    }

    #[tokio::test]
    async fn pending_wird_von_aussen_aufgeloest() {
        let broker = Arc::new(PendingBroker::new());
        let peer = PeerKey::new("p");

        let anfrage = {
            let broker = Arc::clone(&broker);
            let peer = peer.clone();
            tokio::spawn(async move { broker.request_stream(&peer).await })
        };

        while !broker.is_pending(&peer) {
            tokio::task::yield_now().await;
        }
        assert!(broker.resolve(&peer, Ok(MediaStream::new(peer.clone()))));

        let stream = anfrage.await.unwrap().unwrap();
        assert_eq!(stream.peer(), &peer);
    }

    #[tokio::test]
    async fn pending_ohne_anfrage() {
        let broker = PendingBroker::new();
        assert!(!broker.resolve(&PeerKey::new("x"), Err(RequestError::Timeout)));
    }
}
