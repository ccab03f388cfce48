use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of one peer connection.
///
/// Transitions are monotonic except `Connected -> {Failed, Closed}`;
/// `Closed` is reachable from anywhere and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PeerState {
    New = 0,
    HaveLocalOffer = 1,
    HaveRemoteAnswer = 2,
    IceChecking = 3,
    IceConnected = 4,
    DtlsHandshaking = 5,
    Connected = 6,
    Failed = 7,
    Closed = 8,
}

impl PeerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::New,
            1 => Self::HaveLocalOffer,
            2 => Self::HaveRemoteAnswer,
            3 => Self::IceChecking,
            4 => Self::IceConnected,
            5 => Self::DtlsHandshaking,
            6 => Self::Connected,
            7 => Self::Failed,
            _ => Self::Closed,
        }
    }
}

/// Published peer state: the control thread writes with release
/// semantics, the send path and the sweep read with acquire semantics.
#[derive(Debug)]
pub struct SharedPeerState(AtomicU8);

impl SharedPeerState {
    #[must_use]
    pub fn new(initial: PeerState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    #[must_use]
    pub fn load(&self) -> PeerState {
        PeerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Unconditional store. Terminal states win races by construction:
    /// callers only move forward in the lifecycle.
    pub fn store(&self, state: PeerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Compare-and-set; returns whether the transition happened.
    pub fn transition(&self, from: PeerState, to: PeerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn transition_is_conditional() {
        let s = SharedPeerState::new(PeerState::New);
        assert!(s.transition(PeerState::New, PeerState::HaveLocalOffer));
        assert!(!s.transition(PeerState::New, PeerState::HaveLocalOffer));
        assert_eq!(s.load(), PeerState::HaveLocalOffer);
    }

    #[test]
    fn closed_roundtrips_through_u8() {
        let s = SharedPeerState::new(PeerState::Closed);
        assert_eq!(s.load(), PeerState::Closed);
    }
}
