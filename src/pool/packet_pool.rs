use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex};

/// Errors produced by [`PacketPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The hard cap on live buffers has been reached.
    Exhausted,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "packet pool exhausted"),
        }
    }
}

impl std::error::Error for PoolError {}

struct PoolShared {
    free_tx: Sender<Vec<u8>>,
    /// Buffers currently parked in the free list.
    free_len: AtomicUsize,
    /// Buffers ever handed out and not retired.
    live: AtomicUsize,
    capacity: usize,
    soft_cap: usize,
    hard_cap: usize,
}

/// Recycles fixed-capacity packet buffers so the ingress hot path never
/// allocates per datagram.
///
/// The free list is an mpsc channel: releases (from any peer thread) push
/// onto the lock-free queue; the single acquirer is the receive loop, so
/// the fast path never contends. Buffers grow on demand up to `hard_cap`;
/// beyond `soft_cap` returned buffers are retired instead of parked.
/// Contents are reused without zeroing — key material never lives here.
pub struct PacketPool {
    shared: Arc<PoolShared>,
    // Single consumer in practice (the receive thread); the mutex keeps the
    // API Sync and is uncontended there.
    free_rx: Mutex<Receiver<Vec<u8>>>,
}

impl PacketPool {
    /// A pool handing out buffers of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize, soft_cap: usize, hard_cap: usize) -> Self {
        let (free_tx, free_rx) = channel();
        Self {
            shared: Arc::new(PoolShared {
                free_tx,
                free_len: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                capacity,
                soft_cap,
                hard_cap,
            }),
            free_rx: Mutex::new(free_rx),
        }
    }

    /// Takes a recycled buffer, or allocates a fresh one below the hard cap.
    ///
    /// The returned buffer always has `len() == capacity`.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] once `hard_cap` buffers are live.
    pub fn acquire(&self) -> Result<PooledBuf, PoolError> {
        let recycled = match self.free_rx.lock() {
            Ok(rx) => match rx.try_recv() {
                Ok(buf) => {
                    self.shared.free_len.fetch_sub(1, Ordering::Relaxed);
                    Some(buf)
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
            },
            Err(_) => None,
        };

        let mut data = match recycled {
            Some(buf) => buf,
            None => {
                if self.shared.live.load(Ordering::Relaxed) >= self.shared.hard_cap {
                    return Err(PoolError::Exhausted);
                }
                self.shared.live.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.shared.capacity)
            }
        };
        data.resize(self.shared.capacity, 0);

        Ok(PooledBuf {
            data,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Byte capacity of every buffer in this pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Buffers handed out and not yet retired (parked ones included).
    #[must_use]
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::Relaxed)
    }

    /// Buffers currently parked in the free list.
    #[must_use]
    pub fn parked(&self) -> usize {
        self.shared.free_len.load(Ordering::Relaxed)
    }
}

/// A buffer checked out of a [`PacketPool`].
///
/// Hands its storage back to the pool on `Drop`; past the soft cap the
/// storage is retired instead.
pub struct PooledBuf {
    data: Vec<u8>,
    shared: Arc<PoolShared>,
}

impl Deref for PooledBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let shared = &self.shared;
        if shared.free_len.load(Ordering::Relaxed) >= shared.soft_cap {
            shared.live.fetch_sub(1, Ordering::Relaxed);
            return;
        }
        let data = std::mem::take(&mut self.data);
        if shared.free_tx.send(data).is_ok() {
            shared.free_len.fetch_add(1, Ordering::Relaxed);
        } else {
            // Pool gone; the buffer just dies with us.
            shared.live.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::thread;

    #[test]
    fn acquire_allocates_up_to_hard_cap() {
        let pool = PacketPool::new(1500, 4, 2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.len(), 1500);
        assert_eq!(pool.live(), 2);
        assert!(matches!(pool.acquire(), Err(PoolError::Exhausted)));
        drop(a);
        drop(b);
        // Released buffers unblock the cap.
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn released_buffer_is_reused() {
        let pool = PacketPool::new(64, 4, 8);
        {
            let mut buf = pool.acquire().unwrap();
            buf[0] = 0xAB;
        }
        assert_eq!(pool.parked(), 1);
        let buf = pool.acquire().unwrap();
        assert_eq!(pool.parked(), 0);
        assert_eq!(pool.live(), 1, "no second allocation expected");
        // Reuse does not zero contents.
        assert_eq!(buf[0], 0xAB);
    }

    #[test]
    fn soft_cap_retires_excess_buffers() {
        let pool = PacketPool::new(64, 1, 8);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        drop(a); // parked (free list was empty)
        drop(b); // retired (free list at soft cap)
        assert_eq!(pool.parked(), 1);
        assert_eq!(pool.live(), 1);
    }

    #[test]
    fn cross_thread_release_returns_home() {
        let pool = Arc::new(PacketPool::new(256, 16, 32));
        let buf = pool.acquire().unwrap();
        let handle = thread::spawn(move || drop(buf));
        handle.join().unwrap();
        assert_eq!(pool.parked(), 1);
        let again = pool.acquire().unwrap();
        assert_eq!(again.len(), 256);
        assert_eq!(pool.live(), 1);
    }
}
