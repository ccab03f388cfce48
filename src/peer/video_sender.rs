use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread::{self, JoinHandle};

use rand::Rng;
use rand::rngs::OsRng;

use crate::log::log_sink::LogSink;
use crate::source::IngressPacket;
use crate::srtp::SrtpContext;
use crate::{sink_debug, sink_warn};

/// Depth of the per-peer send queue. One queue per peer keeps the
/// fan-out non-blocking for the ingress thread and preserves per-peer
/// packet order.
const QUEUE_DEPTH: usize = 256;

/// Commands consumed by the send pipeline worker.
pub enum SendCmd {
    /// Arms the pipeline: SRTP context plus the nominated pair to write
    /// to. Sent by the control thread once DTLS completes.
    Activate {
        ctx: Box<SrtpContext>,
        sock: Arc<UdpSocket>,
        remote: SocketAddr,
    },
    Packet(Arc<IngressPacket>),
    Close,
}

/// The per-peer outbound pipeline: a single-producer queue drained by
/// one worker thread that rewrites, protects and transmits each packet.
///
/// Header rewriting per peer: a fresh monotonic sequence starting at a
/// random value, the input timestamp shifted by a constant random
/// offset, the peer's own SSRC, marker and payload type preserved, and
/// padding/extensions/CSRCs stripped.
pub struct VideoSender {
    tx: SyncSender<SendCmd>,
    handle: Option<JoinHandle<()>>,
    failures: Arc<AtomicU32>,
}

impl VideoSender {
    #[must_use]
    pub fn spawn(logger: Arc<dyn LogSink>, outbound_ssrc: u32, failures: Arc<AtomicU32>) -> Self {
        let (tx, rx) = sync_channel(QUEUE_DEPTH);
        let worker_failures = Arc::clone(&failures);
        let handle = thread::Builder::new()
            .name("peer-send".into())
            .spawn(move || send_loop(rx, logger, outbound_ssrc, &worker_failures))
            .ok();
        Self {
            tx,
            handle,
            failures,
        }
    }

    /// A second sender for the control thread (activation/close).
    #[must_use]
    pub fn command_sender(&self) -> SyncSender<SendCmd> {
        self.tx.clone()
    }

    /// Enqueues a packet without blocking.
    ///
    /// # Errors
    /// `TrySendError` when the queue is full or the worker is gone; the
    /// caller counts it as a send failure.
    pub fn send_packet(&self, pkt: Arc<IngressPacket>) -> Result<(), TrySendError<SendCmd>> {
        self.tx.try_send(SendCmd::Packet(pkt))
    }

    /// Consecutive failures observed by the worker (reset on success).
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Asks the worker to wipe its keys and exit, then joins it.
    /// Blocking send: a full queue must not lose the Close command (the
    /// worker is draining, so space frees up).
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(SendCmd::Close);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for VideoSender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct SendTarget {
    ctx: Box<SrtpContext>,
    sock: Arc<UdpSocket>,
    remote: SocketAddr,
}

fn send_loop(
    rx: Receiver<SendCmd>,
    logger: Arc<dyn LogSink>,
    ssrc: u32,
    failures: &AtomicU32,
) {
    let mut target: Option<SendTarget> = None;
    // Random origin, capped below 0x8000 so a receiver that joins on the
    // first packet cannot misread the rollover counter.
    let mut sequence: u16 = OsRng.gen_range(0..0x8000);
    let timestamp_offset: u32 = OsRng.r#gen();
    let mut scratch: Vec<u8> = Vec::with_capacity(1500 + 16);

    while let Ok(cmd) = rx.recv() {
        match cmd {
            SendCmd::Activate { ctx, sock, remote } => {
                sink_debug!(&logger, "[SEND] pipeline armed towards {}", remote);
                target = Some(SendTarget { ctx, sock, remote });
            }
            SendCmd::Packet(pkt) => {
                let Some(t) = &mut target else {
                    // Not connected yet; dropped silently by contract.
                    continue;
                };
                sequence = sequence.wrapping_add(1);
                match transmit(t, &pkt, ssrc, sequence, timestamp_offset, &mut scratch) {
                    Ok(()) => failures.store(0, Ordering::Relaxed),
                    Err(reason) => {
                        failures.fetch_add(1, Ordering::Relaxed);
                        sink_warn!(&logger, "[SEND] packet dropped: {}", reason);
                    }
                }
            }
            SendCmd::Close => break,
        }
    }

    if let Some(mut t) = target {
        t.ctx.close();
    }
}

fn transmit(
    target: &mut SendTarget,
    pkt: &IngressPacket,
    ssrc: u32,
    sequence: u16,
    timestamp_offset: u32,
    scratch: &mut Vec<u8>,
) -> Result<(), String> {
    let payload = pkt.payload().map_err(|e| e.to_string())?;

    scratch.clear();
    // Fixed 12-byte header only: padding, extensions and CSRCs from the
    // ingress packet are not forwarded.
    scratch.push(0x80);
    scratch.push(((pkt.header.marker as u8) << 7) | (pkt.header.payload_type & 0x7F));
    scratch.extend_from_slice(&sequence.to_be_bytes());
    scratch
        .extend_from_slice(&pkt.header.timestamp.wrapping_add(timestamp_offset).to_be_bytes());
    scratch.extend_from_slice(&ssrc.to_be_bytes());
    scratch.extend_from_slice(payload);

    target.ctx.protect(scratch).map_err(|e| e.to_string())?;
    target
        .sock
        .send_to(scratch, target.remote)
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::pool::PacketPool;
    use crate::rtp::{RtpHeaderView, RtpPacket};
    use crate::source::UdpRtpSource;
    use crate::srtp::SrtpEndpointKeys;
    use std::sync::Mutex;
    use std::time::Duration;

    fn master() -> SrtpEndpointKeys {
        SrtpEndpointKeys {
            master_key: (0..16).collect(),
            master_salt: (50..64).collect(),
        }
    }

    /// Delivers a handful of ingress packets through a real source so the
    /// pipeline sees genuine `IngressPacket`s, then checks the rewritten
    /// SRTP output on a loopback socket.
    #[test]
    fn pipeline_rewrites_and_protects() {
        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let failures = Arc::new(AtomicU32::new(0));
        let out_sock = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        out_sock
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let out_addr = out_sock.local_addr().unwrap();

        let ssrc = 0x5151_5151;
        let sender = VideoSender::spawn(logger.clone(), ssrc, Arc::clone(&failures));
        sender
            .command_sender()
            .try_send(SendCmd::Activate {
                ctx: Box::new(SrtpContext::active(logger.clone(), master()).unwrap()),
                sock: Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap()),
                remote: out_addr,
            })
            .ok()
            .unwrap();

        // Feed ingress packets through a real UdpRtpSource into the sender.
        let captured: Arc<Mutex<Vec<Arc<IngressPacket>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let pool = Arc::new(PacketPool::new(1500, 4, 16));
        let source = UdpRtpSource::start(
            logger.clone(),
            "127.0.0.1:0".parse().unwrap(),
            pool,
            Arc::new(move |p| sink.lock().unwrap().push(p)),
        )
        .unwrap();
        let feeder = UdpSocket::bind("127.0.0.1:0").unwrap();
        for (seq, marker) in [(100u16, false), (101, true)] {
            let pkt = RtpPacket::simple(96, marker, seq, 90_000, 0xAAAA_0001, b"nal".to_vec());
            feeder
                .send_to(&pkt.encode().unwrap(), source.local_addr())
                .unwrap();
        }
        for _ in 0..100 {
            if captured.lock().unwrap().len() == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let pkts: Vec<Arc<IngressPacket>> = captured.lock().unwrap().clone();
        assert_eq!(pkts.len(), 2);
        for p in &pkts {
            assert!(sender.send_packet(Arc::clone(p)).is_ok());
        }

        // Decrypt what came out and compare against the input.
        let mut recv_ctx = SrtpContext::active(logger, master()).unwrap();
        let mut seqs = Vec::new();
        let mut ts_offsets = Vec::new();
        for p in &pkts {
            let mut buf = [0u8; 2048];
            let (n, _) = out_sock.recv_from(&mut buf).unwrap();
            let mut wire = buf[..n].to_vec();
            recv_ctx.unprotect(&mut wire).unwrap();
            let view = RtpHeaderView::parse(&wire).unwrap();
            assert_eq!(view.ssrc, ssrc, "SSRC must be rewritten");
            assert_eq!(view.payload_type, 96);
            assert_eq!(view.marker, p.header.marker, "marker must be preserved");
            assert_eq!(view.header_len, 12, "extensions/CSRCs stripped");
            assert_eq!(view.payload(&wire).unwrap(), b"nal");
            seqs.push(view.sequence_number);
            ts_offsets.push(view.timestamp.wrapping_sub(p.header.timestamp));
        }
        // Sequence numbers advance by exactly one per packet, and the
        // timestamp offset is the same constant for the peer's lifetime.
        assert_eq!(seqs[1], seqs[0].wrapping_add(1));
        assert_eq!(ts_offsets[0], ts_offsets[1]);
        assert_eq!(failures.load(Ordering::Relaxed), 0);
        drop(source);
    }

    #[test]
    fn packets_before_activation_are_dropped_silently() {
        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let failures = Arc::new(AtomicU32::new(0));
        let sender = VideoSender::spawn(logger.clone(), 1, Arc::clone(&failures));

        let captured: Arc<Mutex<Vec<Arc<IngressPacket>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let pool = Arc::new(PacketPool::new(1500, 4, 16));
        let source = UdpRtpSource::start(
            logger,
            "127.0.0.1:0".parse().unwrap(),
            pool,
            Arc::new(move |p| sink.lock().unwrap().push(p)),
        )
        .unwrap();
        let feeder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let pkt = RtpPacket::simple(96, false, 1, 2, 3, b"x".to_vec());
        feeder
            .send_to(&pkt.encode().unwrap(), source.local_addr())
            .unwrap();
        for _ in 0..100 {
            if !captured.lock().unwrap().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let p = captured.lock().unwrap().remove(0);
        assert!(sender.send_packet(p).is_ok());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(failures.load(Ordering::Relaxed), 0, "silent drop, not a failure");
        drop(source);
    }
}
