use std::{fmt, str::FromStr};

use super::sdp_error::SdpError;

/// The `c=` line: network type, address type, connection address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub net_type: String,
    pub addr_type: String,
    pub address: String,
}

impl Connection {
    #[must_use]
    pub fn new<A: Into<String>, B: Into<String>, C: Into<String>>(
        net_type: A,
        addr_type: B,
        address: C,
    ) -> Self {
        Self {
            net_type: net_type.into(),
            addr_type: addr_type.into(),
            address: address.into(),
        }
    }
}

impl FromStr for Connection {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(SdpError::Invalid("c="));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.net_type, self.addr_type, self.address)
    }
}
