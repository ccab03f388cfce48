use std::io::ErrorKind;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use openssl::ssl::SslStream;
use rand::Rng;
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::config::RestreamerConfig;
use crate::dtls::{
    DatagramChannel, DtlsIdentity, DtlsRole, run_dtls_handshake,
};
use crate::ice::{Demuxed, IceAgent, IceAgentState, IceConfig};
use crate::log::log_sink::LogSink;
use crate::rtcp::RtcpPacket;
use crate::rtcp::packet_type::is_rtcp_payload_type;
use crate::source::IngressPacket;
use crate::srtp::{SrtpContext, SrtpSessionConfig};
use crate::{sink_debug, sink_info, sink_warn};

use super::offer::{OfferParams, build_offer};
use super::peer_error::PeerError;
use super::peer_state::{PeerState, SharedPeerState};
use super::remote_description::RemoteAnswer;
use super::video_sender::{SendCmd, VideoSender};

/// Cadence of the control loop between socket polls.
const CONTROL_TICK: Duration = Duration::from_millis(10);
/// Poll timeout for the post-handshake close_notify watch.
const ALERT_POLL: Duration = Duration::from_millis(5);

/// Where the negotiation state machine keeps the ICE agent before the
/// control thread takes over.
enum NegotiationSlot {
    /// Agent gathered, waiting for offer/answer.
    Idle(Box<IceAgent>),
    /// Agent moved into the running control thread.
    Running,
}

/// One browser peer: composes the ICE agent, the DTLS-SRTP transport,
/// the SRTP contexts and the outbound send pipeline.
///
/// The lifecycle runs on a dedicated control thread once the remote
/// answer arrives; the published state is read lock-free by the fan-out
/// path.
pub struct PeerConnection {
    id: Uuid,
    logger: Arc<dyn LogSink>,
    state: Arc<SharedPeerState>,
    outbound_ssrc: u32,
    cname: String,
    identity: Arc<DtlsIdentity>,
    dtls_timeout: Duration,
    negotiation: Mutex<NegotiationSlot>,
    sender: Mutex<VideoSender>,
    sender_cmd: SyncSender<SendCmd>,
    failures: Arc<AtomicU32>,
    shutdown: Arc<AtomicBool>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl PeerConnection {
    /// Creates the peer: gathers host candidates, rolls the outbound
    /// SSRC and cname, and spawns the (idle) send pipeline.
    #[must_use]
    pub fn new(
        logger: Arc<dyn LogSink>,
        identity: Arc<DtlsIdentity>,
        cfg: &RestreamerConfig,
    ) -> Self {
        let ice_config = IceConfig {
            timeout: cfg.ice_timeout,
            keepalive: cfg.ice_keepalive,
            disconnect_after: cfg.ice_disconnect_after,
        };
        let agent = IceAgent::new(logger.clone(), ice_config);

        let outbound_ssrc: u32 = OsRng.r#gen();
        let cname = format!("restream-{:08x}", OsRng.r#gen::<u32>());
        let failures = Arc::new(AtomicU32::new(0));
        let sender = VideoSender::spawn(logger.clone(), outbound_ssrc, Arc::clone(&failures));
        let sender_cmd = sender.command_sender();

        Self {
            id: Uuid::new_v4(),
            logger,
            state: Arc::new(SharedPeerState::new(PeerState::New)),
            outbound_ssrc,
            cname,
            identity,
            dtls_timeout: cfg.dtls_timeout,
            negotiation: Mutex::new(NegotiationSlot::Idle(Box::new(agent))),
            sender: Mutex::new(sender),
            sender_cmd,
            failures,
            shutdown: Arc::new(AtomicBool::new(false)),
            control: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> PeerState {
        self.state.load()
    }

    #[must_use]
    pub fn outbound_ssrc(&self) -> u32 {
        self.outbound_ssrc
    }

    /// Consecutive send failures; the sweep compares this against the
    /// configured threshold.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Generates the local offer and moves to `HaveLocalOffer`.
    ///
    /// # Errors
    /// [`PeerError::InvalidState`] unless the peer is `New`.
    pub fn create_offer(&self) -> Result<String, PeerError> {
        if !self
            .state
            .transition(PeerState::New, PeerState::HaveLocalOffer)
        {
            return Err(PeerError::InvalidState("create_offer"));
        }
        let slot = self
            .negotiation
            .lock()
            .map_err(|_| PeerError::InvalidState("create_offer"))?;
        let NegotiationSlot::Idle(agent) = &*slot else {
            return Err(PeerError::InvalidState("create_offer"));
        };

        let (ufrag, pwd) = agent.credentials();
        let candidates = agent.local_candidates();
        let sdp = build_offer(&OfferParams {
            ice_ufrag: ufrag,
            ice_pwd: pwd,
            fingerprint: self.identity.fingerprint(),
            outbound_ssrc: self.outbound_ssrc,
            cname: &self.cname,
            candidates: &candidates,
        });
        sink_info!(
            &self.logger,
            "[PEER {}] offer created ({} candidates)",
            self.id,
            candidates.len()
        );
        Ok(sdp.encode())
    }

    /// Ingests the remote answer and starts ICE, then DTLS, on the
    /// control thread.
    ///
    /// # Errors
    /// [`PeerError::Rejected`] with the validation failure, or
    /// [`PeerError::InvalidState`] unless the peer is `HaveLocalOffer`.
    pub fn set_remote_description(&self, sdp: &str) -> Result<(), PeerError> {
        let answer = RemoteAnswer::parse(sdp)?;
        if !self
            .state
            .transition(PeerState::HaveLocalOffer, PeerState::HaveRemoteAnswer)
        {
            return Err(PeerError::InvalidState("set_remote_description"));
        }

        let mut slot = self
            .negotiation
            .lock()
            .map_err(|_| PeerError::InvalidState("set_remote_description"))?;
        let NegotiationSlot::Idle(agent) =
            std::mem::replace(&mut *slot, NegotiationSlot::Running)
        else {
            return Err(PeerError::InvalidState("set_remote_description"));
        };
        drop(slot);

        sink_info!(
            &self.logger,
            "[PEER {}] answer accepted (setup:{}, {} candidates)",
            self.id,
            answer.setup,
            answer.candidates.len()
        );

        let ctx = ControlContext {
            logger: self.logger.clone(),
            peer_id: self.id,
            state: Arc::clone(&self.state),
            identity: Arc::clone(&self.identity),
            dtls_timeout: self.dtls_timeout,
            sender_cmd: self.sender_cmd.clone(),
            failures: Arc::clone(&self.failures),
            shutdown: Arc::clone(&self.shutdown),
        };
        let handle = thread::Builder::new()
            .name("peer-control".into())
            .spawn(move || run_control(*agent, answer, ctx))
            .ok();
        if let Ok(mut control) = self.control.lock() {
            *control = handle;
        }
        Ok(())
    }

    /// Fans one ingress packet into this peer's pipeline. A no-op unless
    /// the peer is `Connected`; queue overflow counts as a send failure.
    pub fn send_video(&self, pkt: &Arc<IngressPacket>) {
        if self.state.load() != PeerState::Connected {
            return;
        }
        if self
            .sender_cmd
            .try_send(SendCmd::Packet(Arc::clone(pkt)))
            .is_err()
        {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Moves a connected peer to `Failed` (sweep decision). Terminal
    /// states are left alone.
    pub fn mark_failed(&self) {
        if self.state.transition(PeerState::Connected, PeerState::Failed) {
            sink_warn!(&self.logger, "[PEER {}] marked failed by sweep", self.id);
        }
    }

    /// Idempotent teardown: stops the control thread, drains the send
    /// pipeline (wiping its keys) and publishes `Closed`.
    pub fn close(&self, reason: &str) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        sink_info!(&self.logger, "[PEER {}] closing: {}", self.id, reason);
        if let Ok(mut control) = self.control.lock() {
            if let Some(h) = control.take() {
                let _ = h.join();
            }
        }
        if let Ok(mut sender) = self.sender.lock() {
            sender.shutdown();
        }
        self.state.store(PeerState::Closed);
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.close("dropped");
    }
}

/// Everything the control thread borrows from the peer.
struct ControlContext {
    logger: Arc<dyn LogSink>,
    peer_id: Uuid,
    state: Arc<SharedPeerState>,
    identity: Arc<DtlsIdentity>,
    dtls_timeout: Duration,
    sender_cmd: SyncSender<SendCmd>,
    failures: Arc<AtomicU32>,
    shutdown: Arc<AtomicBool>,
}

type HandshakeResult = Result<(SrtpSessionConfig, SslStream<DatagramChannel>), crate::dtls::DtlsError>;

/// The peer lifecycle after the answer: drive ICE, run the DTLS
/// handshake over the nominated pair, arm SRTP, then keep servicing
/// keepalives, inbound RTCP and the close_notify watch.
fn run_control(mut agent: IceAgent, answer: RemoteAnswer, ctx: ControlContext) {
    let now = Instant::now();
    agent.set_remote_credentials(&answer.ufrag, &answer.pwd, answer.ice_lite);
    for candidate in answer.candidates.clone() {
        agent.add_remote_candidate(candidate, now);
    }
    agent.begin_checks(now);
    ctx.state.store(PeerState::IceChecking);

    let sockets = agent.sockets();
    let (dtls_tx, dtls_rx) = mpsc::channel::<Vec<u8>>();
    let mut dtls_rx_slot = Some(dtls_rx);
    let mut handshake: Option<(JoinHandle<()>, Receiver<HandshakeResult>)> = None;
    let mut stream: Option<SslStream<DatagramChannel>> = None;
    let mut recv_ctx: Option<SrtpContext> = None;
    let mut buf = [0u8; 2048];

    loop {
        if ctx.shutdown.load(Ordering::Acquire) {
            break;
        }
        let now = Instant::now();
        agent.drive(now);

        match agent.state() {
            IceAgentState::Failed => {
                sink_warn!(&ctx.logger, "[PEER {}] ICE failed", ctx.peer_id);
                ctx.state.store(PeerState::Failed);
                break;
            }
            IceAgentState::Connected | IceAgentState::Completed => {
                ctx.state
                    .transition(PeerState::IceChecking, PeerState::IceConnected);
            }
            _ => {}
        }

        // Pump all candidate sockets through the demultiplexer.
        for (idx, sock) in sockets.iter().enumerate() {
            loop {
                match sock.recv_from(&mut buf) {
                    Ok((n, from)) => {
                        match agent.handle_datagram(&buf[..n], from, idx, now) {
                            Demuxed::Dtls(bytes) => {
                                let _ = dtls_tx.send(bytes);
                            }
                            Demuxed::Rtp(bytes) => {
                                handle_inbound_rtp(bytes, &mut recv_ctx, &ctx);
                            }
                            Demuxed::Consumed | Demuxed::Dropped => {}
                        }
                    }
                    Err(ref e)
                        if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                    {
                        break;
                    }
                    Err(_) => break,
                }
            }
        }

        // ICE nominated a pair and no handshake has run yet: start it.
        if stream.is_none()
            && handshake.is_none()
            && matches!(
                agent.state(),
                IceAgentState::Connected | IceAgentState::Completed
            )
        {
            if let (Some((sock, remote)), Some(rx)) =
                (agent.selected_pair(), dtls_rx_slot.take())
            {
                ctx.state.store(PeerState::DtlsHandshaking);
                let channel = DatagramChannel::new(
                    rx,
                    sock,
                    remote,
                    ctx.dtls_timeout,
                    ctx.logger.clone(),
                );
                let role = DtlsRole::from_remote_setup(&answer.setup);
                let identity = Arc::clone(&ctx.identity);
                let fingerprint = answer.fingerprint.clone();
                let timeout = ctx.dtls_timeout;
                let logger = ctx.logger.clone();
                let (res_tx, res_rx) = mpsc::channel();
                let handle = thread::Builder::new()
                    .name("dtls-handshake".into())
                    .spawn(move || {
                        let result = run_dtls_handshake(
                            channel,
                            role,
                            &identity,
                            fingerprint,
                            timeout,
                            logger,
                        );
                        let _ = res_tx.send(result);
                    })
                    .ok();
                if let Some(handle) = handle {
                    handshake = Some((handle, res_rx));
                } else {
                    ctx.state.store(PeerState::Failed);
                    break;
                }
            }
        }

        // Collect the handshake outcome without blocking the ICE loop.
        if let Some((handle, res_rx)) = handshake.take() {
            match res_rx.try_recv() {
                Err(TryRecvError::Empty) => handshake = Some((handle, res_rx)),
                Ok(Ok((srtp_cfg, s))) => {
                    let _ = handle.join();
                    if !arm_srtp(&mut agent, srtp_cfg, s, &mut stream, &mut recv_ctx, &ctx) {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    let _ = handle.join();
                    sink_warn!(&ctx.logger, "[PEER {}] DTLS failed: {}", ctx.peer_id, e);
                    ctx.state.store(PeerState::Failed);
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    let _ = handle.join();
                    ctx.state.store(PeerState::Failed);
                    break;
                }
            }
        }

        // Post-handshake: a close_notify from the browser ends the peer.
        if let Some(s) = &mut stream {
            match s.read(&mut buf) {
                Ok(0) => {
                    sink_info!(
                        &ctx.logger,
                        "[PEER {}] peer sent close_notify",
                        ctx.peer_id
                    );
                    ctx.state.store(PeerState::Closed);
                    break;
                }
                Ok(_) => {} // no application data is expected; ignore
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    sink_warn!(
                        &ctx.logger,
                        "[PEER {}] dtls read error: {}",
                        ctx.peer_id,
                        e
                    );
                }
            }
        } else {
            thread::sleep(CONTROL_TICK);
        }
    }

    if let Some(mut c) = recv_ctx.take() {
        c.close();
    }
    agent.close();
}

/// Builds both SRTP contexts from the exported keys, hands the send
/// context to the pipeline and publishes `Connected`.
fn arm_srtp(
    agent: &mut IceAgent,
    srtp_cfg: SrtpSessionConfig,
    mut stream: SslStream<DatagramChannel>,
    stream_slot: &mut Option<SslStream<DatagramChannel>>,
    recv_ctx: &mut Option<SrtpContext>,
    ctx: &ControlContext,
) -> bool {
    let Some((sock, remote)) = agent.selected_pair() else {
        ctx.state.store(PeerState::Failed);
        return false;
    };
    let send_ctx = match SrtpContext::active(ctx.logger.clone(), srtp_cfg.outbound) {
        Ok(c) => c,
        Err(e) => {
            sink_warn!(&ctx.logger, "[PEER {}] SRTP setup failed: {}", ctx.peer_id, e);
            ctx.state.store(PeerState::Failed);
            return false;
        }
    };
    let inbound = match SrtpContext::active(ctx.logger.clone(), srtp_cfg.inbound) {
        Ok(c) => c,
        Err(e) => {
            sink_warn!(&ctx.logger, "[PEER {}] SRTP setup failed: {}", ctx.peer_id, e);
            ctx.state.store(PeerState::Failed);
            return false;
        }
    };

    if ctx
        .sender_cmd
        .try_send(SendCmd::Activate {
            ctx: Box::new(send_ctx),
            sock,
            remote,
        })
        .is_err()
    {
        ctx.state.store(PeerState::Failed);
        return false;
    }

    // From here the channel only carries occasional alerts; poll short.
    stream.get_mut().set_read_timeout(ALERT_POLL);
    *stream_slot = Some(stream);
    *recv_ctx = Some(inbound);
    ctx.state.store(PeerState::Connected);
    sink_info!(&ctx.logger, "[PEER {}] connected", ctx.peer_id);
    true
}

/// Inbound 128..=191 traffic: SRTCP is unprotected and logged (receive
/// reports are diagnostics only for a sendonly stream); plain SRTP from
/// the browser is unexpected and dropped.
fn handle_inbound_rtp(bytes: Vec<u8>, recv_ctx: &mut Option<SrtpContext>, ctx: &ControlContext) {
    let Some(srtp) = recv_ctx else {
        return;
    };
    if bytes.len() < 2 || !is_rtcp_payload_type(bytes[1]) {
        sink_debug!(
            &ctx.logger,
            "[PEER {}] unexpected inbound RTP dropped",
            ctx.peer_id
        );
        return;
    }
    let mut packet = bytes;
    match srtp.unprotect_rtcp(&mut packet) {
        Ok(()) => match RtcpPacket::decode_compound(&packet) {
            Ok(reports) => {
                // RTCP arrives every few seconds per peer; ingest for
                // diagnostics only, no feedback is generated.
                for report in &reports {
                    match report {
                        RtcpPacket::Rr(rr) => sink_info!(
                            &ctx.logger,
                            "[PEER {}] receiver report from ssrc={:#x} ({} blocks)",
                            ctx.peer_id,
                            rr.ssrc,
                            rr.reports.len()
                        ),
                        other => sink_info!(
                            &ctx.logger,
                            "[PEER {}] rtcp: {:?}",
                            ctx.peer_id,
                            other
                        ),
                    }
                }
            }
            Err(e) => {
                sink_warn!(&ctx.logger, "[PEER {}] malformed RTCP: {}", ctx.peer_id, e);
            }
        },
        Err(e) => {
            sink_warn!(&ctx.logger, "[PEER {}] SRTCP rejected: {}", ctx.peer_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::peer::peer_error::AnswerRejection;

    fn test_peer() -> PeerConnection {
        let cfg = RestreamerConfig::new("127.0.0.1:0".parse().unwrap());
        let identity = Arc::new(DtlsIdentity::generate().unwrap());
        PeerConnection::new(Arc::new(NoopLogSink), identity, &cfg)
    }

    #[test]
    fn offer_moves_state_and_is_one_shot() {
        let peer = test_peer();
        assert_eq!(peer.state(), PeerState::New);
        let offer = peer.create_offer().unwrap();
        assert_eq!(peer.state(), PeerState::HaveLocalOffer);
        assert!(offer.contains("m=video 9 UDP/TLS/RTP/SAVP 96"));
        assert!(offer.contains(&format!("a=ssrc:{} cname:", peer.outbound_ssrc())));
        assert!(matches!(
            peer.create_offer(),
            Err(PeerError::InvalidState(_))
        ));
    }

    #[test]
    fn answer_requires_local_offer_first() {
        let peer = test_peer();
        let err = peer.set_remote_description("v=0\r\n").unwrap_err();
        // Parsed first: garbage is a rejection, not a state error.
        assert!(matches!(
            err,
            PeerError::Rejected(AnswerRejection::MalformedSdp)
        ));
    }

    #[test]
    fn bad_answer_leaves_state_untouched() {
        let peer = test_peer();
        let _ = peer.create_offer().unwrap();
        let err = peer
            .set_remote_description("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\n")
            .unwrap_err();
        assert!(matches!(
            err,
            PeerError::Rejected(AnswerRejection::NoMatchingMedia)
        ));
        assert_eq!(peer.state(), PeerState::HaveLocalOffer);
    }

    #[test]
    fn close_is_idempotent_and_send_video_noops() {
        let peer = test_peer();
        peer.close("test");
        peer.close("again");
        assert_eq!(peer.state(), PeerState::Closed);
        // send_video after close must be a silent no-op.
        // (No packet source here: state gate alone proves the path.)
        assert_eq!(peer.consecutive_failures(), 0);
    }

    #[test]
    fn answer_with_wrong_transport_is_rejected() {
        let peer = test_peer();
        let _ = peer.create_offer().unwrap();
        let answer = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\n\
m=video 9 RTP/AVP 96\r\na=ice-ufrag:u\r\na=ice-pwd:p\r\n\
a=fingerprint:sha-256 AA\r\na=setup:active\r\n";
        assert!(matches!(
            peer.set_remote_description(answer).unwrap_err(),
            PeerError::Rejected(AnswerRejection::UnsupportedTransport)
        ));
    }
}
