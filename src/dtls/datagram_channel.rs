use core::fmt;
use std::{
    io::{self, Cursor, Read, Write},
    net::{SocketAddr, UdpSocket},
    sync::Arc,
    sync::mpsc::{Receiver, RecvTimeoutError},
    time::Duration,
};

use crate::log::log_sink::LogSink;
use crate::sink_trace;

/// Datagram transport the DTLS stack runs over.
///
/// Inbound records arrive on an mpsc channel, pushed by the ICE agent's
/// first-byte demultiplexer (the socket is shared with STUN and SRTP, so
/// nobody reads it directly). Outbound records go straight to the
/// nominated pair's socket.
pub struct DatagramChannel {
    rx: Receiver<Vec<u8>>,
    sock: Arc<UdpSocket>,
    peer: SocketAddr,
    pending: Cursor<Vec<u8>>,
    read_timeout: Duration,
    logger: Arc<dyn LogSink>,
}

impl fmt::Debug for DatagramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramChannel")
            .field("peer", &self.peer)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl DatagramChannel {
    #[must_use]
    pub fn new(
        rx: Receiver<Vec<u8>>,
        sock: Arc<UdpSocket>,
        peer: SocketAddr,
        read_timeout: Duration,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            rx,
            sock,
            peer,
            pending: Cursor::new(Vec::new()),
            read_timeout,
            logger,
        }
    }

    /// Adjusts how long a `read` blocks before reporting `WouldBlock`.
    /// The handshake uses the full deadline; the post-handshake alert
    /// watch polls with a short timeout.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}

impl Read for DatagramChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Serve leftovers of the previous datagram first.
        if self.pending.position() < self.pending.get_ref().len() as u64 {
            return self.pending.read(buf);
        }

        match self.rx.recv_timeout(self.read_timeout) {
            Ok(datagram) => {
                sink_trace!(
                    &self.logger,
                    "[DTLS IO] {} byte record from {}",
                    datagram.len(),
                    self.peer
                );
                self.pending = Cursor::new(datagram);
                self.pending.read(buf)
            }
            Err(RecvTimeoutError::Timeout) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::from(io::ErrorKind::ConnectionAborted))
            }
        }
    }
}

impl Write for DatagramChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        sink_trace!(
            &self.logger,
            "[DTLS IO] sending {} bytes to {}",
            buf.len(),
            self.peer
        );
        self.sock.send_to(buf, self.peer)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
