use std::fmt;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::log::log_sink::LogSink;
use crate::pool::{PacketPool, PooledBuf};
use crate::rtp::{RtpError, RtpHeaderView};
use crate::{sink_error, sink_info, sink_warn};

/// How long the blocking receive waits before rechecking shutdown.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// One validated RTP datagram in a pooled buffer. Dropping the last
/// reference returns the buffer to the pool.
pub struct IngressPacket {
    buf: PooledBuf,
    len: usize,
    pub header: RtpHeaderView,
    pub received_at: Instant,
}

impl IngressPacket {
    /// The full datagram bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Payload slice (header and padding stripped).
    ///
    /// # Errors
    /// [`RtpError::PaddingTooShort`] if the padding trailer lies.
    pub fn payload(&self) -> Result<&[u8], RtpError> {
        self.header.payload(self.bytes())
    }
}

impl fmt::Debug for IngressPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngressPacket")
            .field("len", &self.len)
            .field("seq", &self.header.sequence_number)
            .field("ssrc", &self.header.ssrc)
            .finish()
    }
}

/// Handler invoked on the receive thread for every valid packet.
pub type RtpHandler = dyn Fn(Arc<IngressPacket>) + Send + Sync;

#[derive(Debug)]
pub enum SourceError {
    Bind(std::io::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(e) => write!(f, "cannot bind ingress socket: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Pooled UDP receiver bound to the ingress endpoint.
///
/// A dedicated OS thread blocks on the socket (with a short timeout so
/// shutdown is prompt), validates each datagram's RTP header and hands
/// the packet to the supplied handler. No SSRC or payload-type
/// filtering happens here; the ingress is trusted.
pub struct UdpRtpSource {
    logger: Arc<dyn LogSink>,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    malformed: Arc<AtomicU64>,
}

impl UdpRtpSource {
    /// Binds the ingress socket and starts the receive loop.
    ///
    /// # Errors
    /// [`SourceError::Bind`] if the endpoint cannot be bound.
    pub fn start(
        logger: Arc<dyn LogSink>,
        listen: SocketAddr,
        pool: Arc<PacketPool>,
        handler: Arc<RtpHandler>,
    ) -> Result<Self, SourceError> {
        let socket = UdpSocket::bind(listen).map_err(SourceError::Bind)?;
        let local_addr = socket.local_addr().map_err(SourceError::Bind)?;
        let _ = socket.set_read_timeout(Some(RECV_TIMEOUT));

        let shutdown = Arc::new(AtomicBool::new(false));
        let malformed = Arc::new(AtomicU64::new(0));

        let thread_logger = logger.clone();
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_malformed = Arc::clone(&malformed);

        sink_info!(&logger, "[SRC] listening for RTP on {}", local_addr);

        let handle = thread::Builder::new()
            .name("rtp-ingress".into())
            .spawn(move || {
                receive_loop(
                    &socket,
                    &pool,
                    handler.as_ref(),
                    &thread_shutdown,
                    &thread_malformed,
                    &thread_logger,
                );
            })
            .ok();

        Ok(Self {
            logger,
            local_addr,
            shutdown,
            handle,
            malformed,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Datagrams rejected by RTP validation so far.
    #[must_use]
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Stops the receive loop and joins the thread.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
        sink_info!(&self.logger, "[SRC] ingress on {} stopped", self.local_addr);
    }
}

impl Drop for UdpRtpSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(
    socket: &UdpSocket,
    pool: &PacketPool,
    handler: &RtpHandler,
    shutdown: &AtomicBool,
    malformed: &AtomicU64,
    logger: &Arc<dyn LogSink>,
) {
    while !shutdown.load(Ordering::Acquire) {
        let mut buf = match pool.acquire() {
            Ok(b) => b,
            Err(e) => {
                // Drain the datagram anyway so the queue cannot wedge.
                sink_warn!(logger, "[SRC] {}; dropping a datagram", e);
                let mut scratch = [0u8; 64];
                let _ = socket.recv_from(&mut scratch);
                continue;
            }
        };

        let len = match socket.recv_from(&mut buf) {
            Ok((n, _from)) => n,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                sink_error!(logger, "[SRC] ingress socket error: {}", e);
                break;
            }
        };

        let header = match RtpHeaderView::parse(&buf[..len]) {
            Ok(h) => h,
            Err(e) => {
                malformed.fetch_add(1, Ordering::Relaxed);
                sink_warn!(logger, "[SRC] malformed RTP ({}), {} bytes dropped", e, len);
                continue;
            }
        };

        handler(Arc::new(IngressPacket {
            buf,
            len,
            header,
            received_at: Instant::now(),
        }));
    }
}
