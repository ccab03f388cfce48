use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunError {
    TooShort,
    /// First byte outside 0..=3 or magic cookie missing.
    NotStun,
    /// Header length field disagrees with the buffer.
    BadLength,
    BadAttribute(u16),
    FingerprintMismatch,
}

impl fmt::Display for StunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use StunError::*;
        match self {
            TooShort => write!(f, "STUN message too short"),
            NotStun => write!(f, "not a STUN message"),
            BadLength => write!(f, "STUN length field mismatch"),
            BadAttribute(t) => write!(f, "malformed STUN attribute {t:#06x}"),
            FingerprintMismatch => write!(f, "STUN fingerprint mismatch"),
        }
    }
}

impl std::error::Error for StunError {}
