use std::{fmt, str::FromStr};

use super::sdp_error::SdpError;

/// The `o=` line: username, session id/version, network and address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub net_type: String,
    pub addr_type: String,
    pub unicast_address: String,
}

impl Origin {
    /// The anonymous origin this crate emits: `- <id> <version> IN IP4 0.0.0.0`.
    #[must_use]
    pub fn anonymous(session_id: u64, session_version: u64) -> Self {
        Self {
            username: "-".to_owned(),
            session_id,
            session_version,
            net_type: "IN".to_owned(),
            addr_type: "IP4".to_owned(),
            unicast_address: "0.0.0.0".to_owned(),
        }
    }
}

impl FromStr for Origin {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 6 {
            return Err(SdpError::Invalid("o="));
        }
        Ok(Self {
            username: parts[0].to_owned(),
            session_id: parts[1].parse()?,
            session_version: parts[2].parse()?,
            net_type: parts[3].to_owned(),
            addr_type: parts[4].to_owned(),
            unicast_address: parts[5].to_owned(),
        })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.net_type,
            self.addr_type,
            self.unicast_address
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn parse_and_format_roundtrip() {
        let o: Origin = "- 4858251974351650128 2 IN IP4 127.0.0.1".parse().unwrap();
        assert_eq!(o.session_id, 4_858_251_974_351_650_128);
        assert_eq!(o.to_string(), "- 4858251974351650128 2 IN IP4 127.0.0.1");
    }

    #[test]
    fn wrong_arity_is_invalid() {
        assert!(matches!(
            "- 1 2 IN IP4".parse::<Origin>(),
            Err(SdpError::Invalid("o="))
        ));
    }
}
