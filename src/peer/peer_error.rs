use std::fmt;

/// Why a remote answer was refused by `set_remote_description`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerRejection {
    /// No `m=video` section with format 96.
    NoMatchingMedia,
    /// The media section is not UDP/TLS/RTP/SAVP.
    UnsupportedTransport,
    /// No `a=fingerprint` anywhere in the answer.
    FingerprintMissing,
    /// Fingerprint present but unparsable or of an unsupported digest.
    FingerprintInvalid,
    /// Anything else structurally wrong (bad SDP, missing credentials).
    MalformedSdp,
}

impl fmt::Display for AnswerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AnswerRejection::*;
        match self {
            NoMatchingMedia => write!(f, "answer has no matching video media"),
            UnsupportedTransport => write!(f, "answer media transport unsupported"),
            FingerprintMissing => write!(f, "answer carries no DTLS fingerprint"),
            FingerprintInvalid => write!(f, "answer DTLS fingerprint invalid"),
            MalformedSdp => write!(f, "answer SDP malformed"),
        }
    }
}

impl std::error::Error for AnswerRejection {}

/// Errors surfaced by peer operations.
#[derive(Debug)]
pub enum PeerError {
    /// The operation is not legal in the peer's current state.
    InvalidState(&'static str),
    /// The answer was parsed but refused.
    Rejected(AnswerRejection),
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState(op) => write!(f, "operation {op} not allowed in this state"),
            Self::Rejected(r) => write!(f, "answer rejected: {r}"),
        }
    }
}

impl std::error::Error for PeerError {}

impl From<AnswerRejection> for PeerError {
    fn from(r: AnswerRejection) -> Self {
        Self::Rejected(r)
    }
}
