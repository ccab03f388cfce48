use std::{fmt, str::FromStr};

use super::sdp_error::SdpError;

/// The `t=` line. Offers here are unbounded sessions: `t=0 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeDesc {
    pub start: u64,
    pub stop: u64,
}

impl FromStr for TimeDesc {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(SdpError::Invalid("t="));
        }
        Ok(Self {
            start: parts[0].parse()?,
            stop: parts[1].parse()?,
        })
    }
}

impl fmt::Display for TimeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.start, self.stop)
    }
}
