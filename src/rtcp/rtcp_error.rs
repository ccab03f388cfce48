use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpError {
    TooShort,
    BadVersion(u8),
    UnknownPacketType(u8),
    /// A sub-report's length field disagrees with its contents.
    LengthMismatch { pt: u8 },
    BadSdesItem,
    BadReason,
}

impl fmt::Display for RtcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RtcpError::*;
        match self {
            TooShort => write!(f, "RTCP buffer too short"),
            BadVersion(v) => write!(f, "bad RTCP version: {v}"),
            UnknownPacketType(pt) => write!(f, "unknown RTCP packet type: {pt}"),
            LengthMismatch { pt } => write!(f, "RTCP length field mismatch in packet type {pt}"),
            BadSdesItem => write!(f, "malformed SDES item"),
            BadReason => write!(f, "malformed BYE reason"),
        }
    }
}

impl std::error::Error for RtcpError {}
