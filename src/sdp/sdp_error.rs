use std::fmt;
use std::num::ParseIntError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    /// A mandatory line (`v=`, `o=`, `s=`) is absent.
    Missing(&'static str),
    /// A line has the wrong shape for its prefix.
    Invalid(&'static str),
    ParseInt,
}

impl fmt::Display for SdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(what) => write!(f, "missing mandatory SDP line: {what}"),
            Self::Invalid(what) => write!(f, "invalid SDP line: {what}"),
            Self::ParseInt => write!(f, "invalid number in SDP"),
        }
    }
}

impl std::error::Error for SdpError {}

impl From<ParseIntError> for SdpError {
    fn from(_: ParseIntError) -> Self {
        Self::ParseInt
    }
}
