//! End-to-end restream flow against a scripted browser-side stack:
//! offer/answer, ICE connectivity, DTLS-SRTP handshake, then SRTP media
//! delivery with per-peer rewriting.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::any::Any;
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use restreamer::config::RestreamerConfig;
use restreamer::dtls::{
    DatagramChannel, DtlsIdentity, DtlsRole, RemoteFingerprint, run_dtls_handshake,
};
use restreamer::ice::gathering::loopback_binding;
use restreamer::ice::{Demuxed, IceAgent, IceConfig, IceRole};
use restreamer::log::{LogSink, NoopLogSink};
use restreamer::restreamer::Restreamer;
use restreamer::rtp::{RtpHeaderView, RtpPacket};
use restreamer::sdp::Sdp;
use restreamer::srtp::{SrtpContext, SrtpSessionConfig};

/// What the browser side pulls out of the restreamer's offer.
struct OfferView {
    ufrag: String,
    pwd: String,
    fingerprint: String,
    ssrc: u32,
    candidates: Vec<String>,
}

fn read_offer(text: &str) -> OfferView {
    let sdp = Sdp::parse(text).unwrap();
    let m = &sdp.media[0];
    let ssrc_line = m.attr_value("ssrc").unwrap();
    let ssrc: u32 = ssrc_line.split_whitespace().next().unwrap().parse().unwrap();
    OfferView {
        ufrag: m.attr_value("ice-ufrag").unwrap().to_owned(),
        pwd: m.attr_value("ice-pwd").unwrap().to_owned(),
        fingerprint: sdp.attr_value("fingerprint").unwrap().to_owned(),
        ssrc,
        candidates: m
            .attr_values("candidate")
            .into_iter()
            .map(ToOwned::to_owned)
            .collect(),
    }
}

type BrowserHandshake = (
    JoinHandle<()>,
    Receiver<Result<(SrtpSessionConfig, Box<dyn Any + Send>), String>>,
);

/// A minimal scripted browser: controlled ICE agent, DTLS client,
/// SRTP receive context.
struct BrowserPeer {
    agent: IceAgent,
    offer: OfferView,
    identity: DtlsIdentity,
    dtls_tx: Sender<Vec<u8>>,
    dtls_rx_slot: Option<Receiver<Vec<u8>>>,
    handshake: Option<BrowserHandshake>,
    /// Keeps the DTLS stream alive so no alert reaches the restreamer.
    _stream_keepalive: Option<Box<dyn Any + Send>>,
    pinned: RemoteFingerprint,
    recv_ctx: Option<SrtpContext>,
    /// Decrypted RTP packets, in arrival order.
    media: Vec<Vec<u8>>,
}

impl BrowserPeer {
    /// Builds the browser side from an offer and returns it together
    /// with the answer SDP to relay back.
    fn accept(offer_text: &str) -> (Self, String) {
        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let offer = read_offer(offer_text);

        let mut agent = IceAgent::with_bindings(
            logger,
            IceConfig::default(),
            vec![loopback_binding().unwrap()],
        );
        agent.set_role(IceRole::Controlled);
        agent.set_remote_credentials(&offer.ufrag, &offer.pwd, false);
        let now = Instant::now();
        for cand in &offer.candidates {
            agent.add_remote_candidate(cand.parse().unwrap(), now);
        }

        let identity = DtlsIdentity::generate().unwrap();
        let (ufrag, pwd) = agent.credentials();
        let candidate = agent.local_candidates().remove(0);
        let answer = format!(
            "v=0\r\no=- 77 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
a=group:BUNDLE v\r\n\
a=fingerprint:sha-256 {}\r\n\
m=video 9 UDP/TLS/RTP/SAVP 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:v\r\n\
a=ice-ufrag:{}\r\n\
a=ice-pwd:{}\r\n\
a=setup:active\r\n\
a=rtpmap:96 H264/90000\r\n\
a=rtcp-mux\r\n\
a=recvonly\r\n\
a=candidate:{}\r\n\
a=end-of-candidates\r\n",
            identity.fingerprint(),
            ufrag,
            pwd,
            candidate.to_attribute_value(),
        );

        agent.begin_checks(now);
        let (dtls_tx, dtls_rx) = mpsc::channel();
        let pinned = RemoteFingerprint::parse(&offer.fingerprint).unwrap();

        let peer = Self {
            agent,
            offer,
            identity,
            dtls_tx,
            dtls_rx_slot: Some(dtls_rx),
            handshake: None,
            _stream_keepalive: None,
            pinned,
            recv_ctx: None,
            media: Vec::new(),
        };
        (peer, answer)
    }

    /// One scheduling round: drive ICE, route datagrams, advance DTLS.
    fn pump(&mut self) {
        let now = Instant::now();
        self.agent.drive(now);

        let sockets = self.agent.sockets();
        let mut buf = [0u8; 2048];
        for (idx, sock) in sockets.iter().enumerate() {
            loop {
                match sock.recv_from(&mut buf) {
                    Ok((n, from)) => {
                        match self.agent.handle_datagram(&buf[..n], from, idx, now) {
                            Demuxed::Dtls(bytes) => {
                                let _ = self.dtls_tx.send(bytes);
                            }
                            Demuxed::Rtp(bytes) => {
                                if let Some(ctx) = &mut self.recv_ctx {
                                    let mut pkt = bytes;
                                    if ctx.unprotect(&mut pkt).is_ok() {
                                        self.media.push(pkt);
                                    }
                                }
                            }
                            _ => {}
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

        // Start the client handshake once a pair is nominated.
        if self.handshake.is_none() && self.recv_ctx.is_none() {
            if let (Some((sock, remote)), Some(rx)) =
                (self.agent.selected_pair(), self.dtls_rx_slot.take())
            {
                let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
                let channel =
                    DatagramChannel::new(rx, sock, remote, Duration::from_secs(10), logger.clone());
                let pinned = self.pinned.clone();
                let identity = self.identity.clone();
                let (res_tx, res_rx) = mpsc::channel();
                let handle = thread::spawn(move || {
                    let outcome = run_dtls_handshake(
                        channel,
                        DtlsRole::Client,
                        &identity,
                        pinned,
                        Duration::from_secs(10),
                        logger,
                    )
                    .map(|(cfg, stream)| {
                        let boxed: Box<dyn Any + Send> = Box::new(stream);
                        (cfg, boxed)
                    })
                    .map_err(|e| e.to_string());
                    let _ = res_tx.send(outcome);
                });
                self.handshake = Some((handle, res_rx));
            }
        }

        // Arm SRTP when the handshake lands.
        if let Some((handle, res_rx)) = self.handshake.take() {
            match res_rx.try_recv() {
                Err(mpsc::TryRecvError::Empty) => self.handshake = Some((handle, res_rx)),
                Ok(Ok((cfg, stream))) => {
                    let _ = handle.join();
                    self._stream_keepalive = Some(stream);
                    self.recv_ctx = Some(
                        SrtpContext::active(Arc::new(NoopLogSink), cfg.inbound).unwrap(),
                    );
                }
                Ok(Err(e)) => panic!("browser-side handshake failed: {e}"),
                Err(mpsc::TryRecvError::Disconnected) => {
                    panic!("browser-side handshake thread vanished")
                }
            }
        }
    }

    fn ready(&self) -> bool {
        self.recv_ctx.is_some()
    }
}

fn wait_until<F: FnMut() -> bool>(mut cond: F, budget: Duration) {
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached within {budget:?}");
}

#[test]
fn restreams_to_two_peers_with_distinct_ssrcs() {
    let cfg = RestreamerConfig::new("127.0.0.1:0".parse().unwrap());
    let restreamer = Restreamer::start(Arc::new(NoopLogSink), cfg).unwrap();
    let ingress = restreamer.ingress_addr().unwrap();

    // Two browser peers join.
    let (id_a, offer_a) = restreamer.append_client().unwrap();
    let (id_b, offer_b) = restreamer.append_client().unwrap();
    assert_ne!(id_a, id_b);

    let (mut browser_a, answer_a) = BrowserPeer::accept(&offer_a);
    let (mut browser_b, answer_b) = BrowserPeer::accept(&offer_b);

    // Each peer's offer advertises its own outbound SSRC.
    assert_ne!(browser_a.offer.ssrc, browser_b.offer.ssrc);

    restreamer.process_client_answer(id_a, &answer_a).unwrap();
    restreamer.process_client_answer(id_b, &answer_b).unwrap();

    // Let ICE + DTLS complete on both sides.
    wait_until(
        || {
            browser_a.pump();
            browser_b.pump();
            browser_a.ready() && browser_b.ready()
        },
        Duration::from_secs(20),
    );

    // Feed the ingress until both browsers hold a few frames.
    let feeder = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut seq: u16 = 100;
    wait_until(
        || {
            let pkt = RtpPacket::simple(
                96,
                seq % 2 == 0,
                seq,
                u32::from(seq) * 3000,
                0xFEED_F00D,
                format!("frame-{seq}").into_bytes(),
            );
            feeder.send_to(&pkt.encode().unwrap(), ingress).unwrap();
            seq = seq.wrapping_add(1);
            browser_a.pump();
            browser_b.pump();
            browser_a.media.len() >= 3 && browser_b.media.len() >= 3
        },
        Duration::from_secs(20),
    );

    // Every delivered packet carries the peer's own SSRC and a fresh,
    // strictly consecutive sequence.
    for (browser, label) in [(&browser_a, "a"), (&browser_b, "b")] {
        let mut prev_seq: Option<u16> = None;
        for wire in &browser.media {
            let view = RtpHeaderView::parse(wire).unwrap();
            assert_eq!(view.ssrc, browser.offer.ssrc, "peer {label} ssrc");
            assert_ne!(view.ssrc, 0xFEED_F00D, "ingress ssrc must be rewritten");
            assert_eq!(view.payload_type, 96);
            assert_eq!(view.header_len, 12);
            let payload = view.payload(wire).unwrap();
            assert!(payload.starts_with(b"frame-"), "payload survives re-streaming");
            if let Some(prev) = prev_seq {
                // Strictly forward (mod 2^16); loopback may rarely drop,
                // so gaps are tolerated but reordering is not.
                let advance = view.sequence_number.wrapping_sub(prev);
                assert!(
                    (1..0x8000).contains(&advance),
                    "peer {label} order: {prev} -> {}",
                    view.sequence_number
                );
            }
            prev_seq = Some(view.sequence_number);
        }
    }

    // The two peers use different rewritten SSRCs on the wire too.
    let first_a = RtpHeaderView::parse(&browser_a.media[0]).unwrap();
    let first_b = RtpHeaderView::parse(&browser_b.media[0]).unwrap();
    assert_ne!(first_a.ssrc, first_b.ssrc);

    restreamer.stop();
}

#[test]
fn answer_with_bad_fingerprint_fails_the_peer() {
    let cfg = RestreamerConfig::new("127.0.0.1:0".parse().unwrap());
    let restreamer = Restreamer::start(Arc::new(NoopLogSink), cfg).unwrap();

    let (id, offer) = restreamer.append_client().unwrap();
    let (mut browser, answer) = BrowserPeer::accept(&offer);

    // Swap the fingerprint in the answer for one of an unrelated cert:
    // the restreamer must abort the handshake, so no media ever flows.
    let unrelated = DtlsIdentity::generate().unwrap();
    let patched = answer.replace(
        &format!("a=fingerprint:sha-256 {}", browser.identity.fingerprint()),
        &format!("a=fingerprint:sha-256 {}", unrelated.fingerprint()),
    );
    assert_ne!(patched, answer, "fingerprint line must have been replaced");
    restreamer.process_client_answer(id, &patched).unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        wait_until(
            || {
                browser.pump();
                !browser.media.is_empty()
            },
            Duration::from_secs(5),
        );
    }));
    assert!(result.is_err(), "no media must flow on fingerprint mismatch");

    restreamer.stop();
}
