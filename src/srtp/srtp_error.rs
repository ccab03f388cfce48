use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SrtpError {
    /// Packet index already seen or older than the replay window.
    ReplayRejected,
    /// Authentication tag did not verify.
    AuthFailed,
    /// Transform requested on a context that is not Active.
    NotActive,
    /// The context is not in the state the call requires.
    BadState,
    /// Packet too small to carry a header (and tag, for unprotect).
    TooShort,
    /// Master key material of the wrong size.
    BadKeyLength,
    /// RTP header declared more bytes than the packet holds.
    BadHeader,
}

impl fmt::Display for SrtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SrtpError::*;
        match self {
            ReplayRejected => write!(f, "SRTP replay rejected"),
            AuthFailed => write!(f, "SRTP auth tag mismatch"),
            NotActive => write!(f, "SRTP context not active"),
            BadState => write!(f, "SRTP context in wrong state for this call"),
            TooShort => write!(f, "packet too short for SRTP"),
            BadKeyLength => write!(f, "bad SRTP master key/salt length"),
            BadHeader => write!(f, "RTP header larger than packet"),
        }
    }
}

impl std::error::Error for SrtpError {}
