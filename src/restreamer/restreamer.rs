use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::RestreamerConfig;
use crate::dtls::DtlsIdentity;
use crate::log::log_sink::LogSink;
use crate::multiplexer::StreamMultiplexer;
use crate::peer::PeerConnection;
use crate::pool::PacketPool;
use crate::restreamer::restream_error::RestreamError;
use crate::source::UdpRtpSource;
use crate::sink_info;

/// How often the sweep thread wakes to check its period and shutdown.
const SWEEP_POLL: Duration = Duration::from_millis(200);

struct Lifecycle {
    source: Option<UdpRtpSource>,
    running: bool,
}

/// Top-level facade owned by the embedding service.
///
/// Owns the ingress source, the peer registry and the background sweep.
/// The three externally visible operations — `append_client`,
/// `process_client_answer`, `stop` — are serialised by one internal
/// lock so registry mutations are linearisable; the lock is never held
/// across packet I/O.
pub struct Restreamer {
    logger: Arc<dyn LogSink>,
    cfg: RestreamerConfig,
    identity: Arc<DtlsIdentity>,
    mux: Arc<StreamMultiplexer>,
    lifecycle: Mutex<Lifecycle>,
    sweep_shutdown: Arc<AtomicBool>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Restreamer {
    /// Brings the pipeline up: certificate identity, packet pool,
    /// multiplexer, ingress receive loop and the sweep thread.
    ///
    /// # Errors
    /// [`RestreamError::Identity`] or [`RestreamError::Ingress`] when
    /// startup resources cannot be created.
    pub fn start(
        logger: Arc<dyn LogSink>,
        cfg: RestreamerConfig,
    ) -> Result<Self, RestreamError> {
        let identity = Arc::new(DtlsIdentity::generate().map_err(RestreamError::Identity)?);
        let pool = Arc::new(PacketPool::new(
            cfg.mtu,
            cfg.pool_soft_cap,
            cfg.pool_hard_cap,
        ));
        let mux = Arc::new(StreamMultiplexer::new(logger.clone()));

        let fanout = Arc::clone(&mux);
        let source = UdpRtpSource::start(
            logger.clone(),
            cfg.rtp_listen,
            pool,
            Arc::new(move |pkt| fanout.broadcast(&pkt)),
        )
        .map_err(RestreamError::Ingress)?;

        let sweep_shutdown = Arc::new(AtomicBool::new(false));
        let sweep_handle = spawn_sweep(
            Arc::clone(&mux),
            cfg.sweep_period,
            cfg.send_failure_threshold,
            Arc::clone(&sweep_shutdown),
        );

        sink_info!(
            &logger,
            "[RESTREAM] started, ingress {}",
            source.local_addr()
        );

        Ok(Self {
            logger,
            cfg,
            identity,
            mux,
            lifecycle: Mutex::new(Lifecycle {
                source: Some(source),
                running: true,
            }),
            sweep_shutdown,
            sweep_handle: Mutex::new(sweep_handle),
        })
    }

    /// The bound ingress endpoint (useful when configured with port 0).
    #[must_use]
    pub fn ingress_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .lock()
            .ok()
            .and_then(|l| l.source.as_ref().map(UdpRtpSource::local_addr))
    }

    /// Registered peer count, any state.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.mux.len()
    }

    /// Creates a peer, registers it and returns its id plus the SDP
    /// offer the embedding service relays to the browser.
    ///
    /// # Errors
    /// [`RestreamError::NotRunning`] after `stop`.
    pub fn append_client(&self) -> Result<(Uuid, String), RestreamError> {
        let lifecycle = self
            .lifecycle
            .lock()
            .map_err(|_| RestreamError::NotRunning)?;
        if !lifecycle.running {
            return Err(RestreamError::NotRunning);
        }

        let peer = Arc::new(PeerConnection::new(
            self.logger.clone(),
            Arc::clone(&self.identity),
            &self.cfg,
        ));
        let offer = peer.create_offer()?;
        let id = peer.id();
        self.mux.register(peer);
        sink_info!(&self.logger, "[RESTREAM] client {} appended", id);
        Ok((id, offer))
    }

    /// Feeds the browser's answer to the peer and starts transmitting
    /// to it once the transport comes up.
    ///
    /// # Errors
    /// [`RestreamError::UnknownPeer`], [`RestreamError::Rejected`] or
    /// [`RestreamError::NotRunning`].
    pub fn process_client_answer(&self, id: Uuid, sdp: &str) -> Result<(), RestreamError> {
        let lifecycle = self
            .lifecycle
            .lock()
            .map_err(|_| RestreamError::NotRunning)?;
        if !lifecycle.running {
            return Err(RestreamError::NotRunning);
        }

        let peer = self.mux.get(id).ok_or(RestreamError::UnknownPeer)?;
        peer.set_remote_description(sdp)?;
        self.mux.start_transmit(id);
        sink_info!(&self.logger, "[RESTREAM] client {} answer processed", id);
        Ok(())
    }

    /// Stops the ingress loop, closes every peer and joins the sweep.
    /// Idempotent; later operations return `NotRunning`.
    pub fn stop(&self) {
        let source = match self.lifecycle.lock() {
            Ok(mut lifecycle) => {
                if !lifecycle.running {
                    return;
                }
                lifecycle.running = false;
                lifecycle.source.take()
            }
            Err(_) => None,
        };
        if let Some(mut source) = source {
            source.stop();
        }

        self.sweep_shutdown.store(true, Ordering::Release);
        if let Ok(mut handle) = self.sweep_handle.lock() {
            if let Some(h) = handle.take() {
                let _ = h.join();
            }
        }

        self.mux.close_all();
        sink_info!(&self.logger, "[RESTREAM] stopped");
    }
}

impl Drop for Restreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Background sweep: every period, promote over-threshold peers to
/// Failed and reap Closed/Failed peers. Works on registry snapshots so
/// it can never race peer creation.
fn spawn_sweep(
    mux: Arc<StreamMultiplexer>,
    period: Duration,
    failure_threshold: u32,
    shutdown: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    thread::Builder::new()
        .name("restream-sweep".into())
        .spawn(move || {
            let mut last_sweep = Instant::now();
            while !shutdown.load(Ordering::Acquire) {
                thread::sleep(SWEEP_POLL);
                if last_sweep.elapsed() < period {
                    continue;
                }
                last_sweep = Instant::now();
                mux.sweep_failures(failure_threshold);
                mux.cleanup();
            }
        })
        .ok()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::peer::PeerState;

    fn start_restreamer() -> Restreamer {
        let cfg = RestreamerConfig::new("127.0.0.1:0".parse().unwrap());
        Restreamer::start(Arc::new(NoopLogSink), cfg).unwrap()
    }

    #[test]
    fn append_returns_offer_and_registers_peer() {
        let r = start_restreamer();
        let (id, offer) = r.append_client().unwrap();
        assert!(offer.starts_with("v=0\r\n"));
        assert!(offer.contains("a=sendonly"));
        assert_eq!(r.client_count(), 1);
        let peer = r.mux.get(id).unwrap();
        assert_eq!(peer.state(), PeerState::HaveLocalOffer);
        r.stop();
    }

    #[test]
    fn answer_for_unknown_peer_is_rejected() {
        let r = start_restreamer();
        assert!(matches!(
            r.process_client_answer(Uuid::new_v4(), "v=0"),
            Err(RestreamError::UnknownPeer)
        ));
        r.stop();
    }

    #[test]
    fn operations_after_stop_are_refused() {
        let r = start_restreamer();
        let (id, _) = r.append_client().unwrap();
        r.stop();
        assert!(matches!(r.append_client(), Err(RestreamError::NotRunning)));
        assert!(matches!(
            r.process_client_answer(id, "v=0"),
            Err(RestreamError::NotRunning)
        ));
    }

    #[test]
    fn stop_closes_registered_peers() {
        let r = start_restreamer();
        let (id, _) = r.append_client().unwrap();
        let peer = r.mux.get(id).unwrap();
        r.stop();
        assert_eq!(peer.state(), PeerState::Closed);
        assert_eq!(r.client_count(), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let r = start_restreamer();
        r.stop();
        r.stop();
    }

    #[test]
    fn malformed_answer_propagates_rejection() {
        let r = start_restreamer();
        let (id, _) = r.append_client().unwrap();
        assert!(matches!(
            r.process_client_answer(id, "garbage"),
            Err(RestreamError::Rejected(_))
        ));
        r.stop();
    }
}
