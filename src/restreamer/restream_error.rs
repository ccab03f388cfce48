use std::fmt;

use crate::dtls::DtlsError;
use crate::peer::{AnswerRejection, PeerError};
use crate::source::SourceError;

/// Errors the facade surfaces to the embedding service.
#[derive(Debug)]
pub enum RestreamError {
    /// The restreamer is stopped.
    NotRunning,
    /// No peer with that id (never created, or already reaped).
    UnknownPeer,
    /// The answer was refused for the contained reason.
    Rejected(AnswerRejection),
    /// The peer was not in a state for this operation.
    InvalidPeerState,
    /// Local identity generation failed at startup.
    Identity(DtlsError),
    /// The ingress socket could not be set up.
    Ingress(SourceError),
}

impl fmt::Display for RestreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => write!(f, "restreamer is not running"),
            Self::UnknownPeer => write!(f, "unknown peer id"),
            Self::Rejected(r) => write!(f, "answer rejected: {r}"),
            Self::InvalidPeerState => write!(f, "peer not in a valid state for this operation"),
            Self::Identity(e) => write!(f, "identity generation failed: {e}"),
            Self::Ingress(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RestreamError {}

impl From<PeerError> for RestreamError {
    fn from(e: PeerError) -> Self {
        match e {
            PeerError::Rejected(r) => Self::Rejected(r),
            PeerError::InvalidState(_) => Self::InvalidPeerState,
        }
    }
}
