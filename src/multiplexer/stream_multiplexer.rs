use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::log::log_sink::LogSink;
use crate::peer::{PeerConnection, PeerState};
use crate::source::IngressPacket;
use crate::{sink_debug, sink_info};

struct PeerEntry {
    peer: Arc<PeerConnection>,
    started: bool,
}

/// Registry of active peers and the RTP fan-out point.
///
/// The registry mutex guards only the map; broadcast takes a snapshot
/// and never holds the lock across I/O or peer calls.
pub struct StreamMultiplexer {
    logger: Arc<dyn LogSink>,
    peers: Mutex<HashMap<Uuid, PeerEntry>>,
}

impl StreamMultiplexer {
    #[must_use]
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            logger,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a peer to the registry (not yet transmitting).
    pub fn register(&self, peer: Arc<PeerConnection>) {
        if let Ok(mut peers) = self.peers.lock() {
            sink_info!(&self.logger, "[MUX] registered peer {}", peer.id());
            peers.insert(peer.id(), PeerEntry { peer, started: false });
        }
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Arc<PeerConnection>> {
        self.peers
            .lock()
            .ok()
            .and_then(|peers| peers.get(&id).map(|e| Arc::clone(&e.peer)))
    }

    /// Includes this peer in subsequent broadcasts.
    pub fn start_transmit(&self, id: Uuid) -> bool {
        self.set_started(id, true)
    }

    /// Removes this peer from subsequent broadcasts; the peer stays
    /// registered and connected.
    pub fn stop_transmit(&self, id: Uuid) -> bool {
        self.set_started(id, false)
    }

    fn set_started(&self, id: Uuid, started: bool) -> bool {
        match self.peers.lock() {
            Ok(mut peers) => match peers.get_mut(&id) {
                Some(entry) => {
                    entry.started = started;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Closes and removes one peer.
    pub fn close_peer(&self, id: Uuid) -> bool {
        let removed = self
            .peers
            .lock()
            .ok()
            .and_then(|mut peers| peers.remove(&id));
        match removed {
            Some(entry) => {
                entry.peer.close("closed by multiplexer");
                true
            }
            None => false,
        }
    }

    /// Fans one packet out to every started peer. Failures are counted
    /// inside each peer and never propagate here; cross-peer order is
    /// unspecified by design.
    pub fn broadcast(&self, pkt: &Arc<IngressPacket>) {
        let snapshot: Vec<Arc<PeerConnection>> = match self.peers.lock() {
            Ok(peers) => peers
                .values()
                .filter(|e| e.started)
                .map(|e| Arc::clone(&e.peer))
                .collect(),
            Err(_) => return,
        };
        for peer in snapshot {
            peer.send_video(pkt);
        }
    }

    /// Sweep half one: peers over the failure threshold go to Failed.
    pub fn sweep_failures(&self, threshold: u32) {
        let snapshot: Vec<Arc<PeerConnection>> = match self.peers.lock() {
            Ok(peers) => peers.values().map(|e| Arc::clone(&e.peer)).collect(),
            Err(_) => return,
        };
        for peer in snapshot {
            if peer.state() == PeerState::Connected && peer.consecutive_failures() > threshold {
                peer.mark_failed();
            }
        }
    }

    /// Sweep half two: Closed and Failed peers leave the registry;
    /// failed ones are closed on the way out.
    pub fn cleanup(&self) {
        let expired: Vec<Arc<PeerConnection>> = match self.peers.lock() {
            Ok(mut peers) => {
                let ids: Vec<Uuid> = peers
                    .iter()
                    .filter(|(_, e)| {
                        matches!(e.peer.state(), PeerState::Closed | PeerState::Failed)
                    })
                    .map(|(id, _)| *id)
                    .collect();
                ids.iter().filter_map(|id| peers.remove(id)).map(|e| e.peer).collect()
            }
            Err(_) => return,
        };
        for peer in expired {
            sink_debug!(
                &self.logger,
                "[MUX] cleaning up peer {} in {:?}",
                peer.id(),
                peer.state()
            );
            peer.close("cleanup");
        }
    }

    /// Closes every peer and empties the registry.
    pub fn close_all(&self) {
        let all: Vec<Arc<PeerConnection>> = match self.peers.lock() {
            Ok(mut peers) => peers.drain().map(|(_, e)| e.peer).collect(),
            Err(_) => return,
        };
        for peer in all {
            peer.close("restreamer stopping");
        }
    }

    /// Registered peer count (any state).
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.lock().map(|p| p.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::config::RestreamerConfig;
    use crate::dtls::DtlsIdentity;
    use crate::log::NoopLogSink;

    fn mux_with_peer() -> (StreamMultiplexer, Arc<PeerConnection>) {
        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let cfg = RestreamerConfig::new("127.0.0.1:0".parse().unwrap());
        let identity = Arc::new(DtlsIdentity::generate().unwrap());
        let peer = Arc::new(PeerConnection::new(logger.clone(), identity, &cfg));
        let mux = StreamMultiplexer::new(logger);
        mux.register(Arc::clone(&peer));
        (mux, peer)
    }

    #[test]
    fn register_lookup_and_transmit_flags() {
        let (mux, peer) = mux_with_peer();
        assert_eq!(mux.len(), 1);
        assert!(mux.get(peer.id()).is_some());
        assert!(mux.start_transmit(peer.id()));
        assert!(mux.stop_transmit(peer.id()));
        assert!(!mux.start_transmit(Uuid::new_v4()));
    }

    #[test]
    fn close_peer_removes_and_closes() {
        let (mux, peer) = mux_with_peer();
        assert!(mux.close_peer(peer.id()));
        assert_eq!(peer.state(), PeerState::Closed);
        assert!(mux.is_empty());
        assert!(!mux.close_peer(peer.id()));
    }

    #[test]
    fn cleanup_reaps_closed_peers_only() {
        let (mux, peer) = mux_with_peer();
        mux.cleanup();
        assert_eq!(mux.len(), 1, "live peer must survive cleanup");
        peer.close("test");
        mux.cleanup();
        assert!(mux.is_empty());
    }

    #[test]
    fn close_all_empties_registry() {
        let (mux, peer) = mux_with_peer();
        mux.close_all();
        assert!(mux.is_empty());
        assert_eq!(peer.state(), PeerState::Closed);
    }
}
