use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use super::candidate_type::CandidateType;

/// Component ID 1 = RTP (rtcp-mux keeps everything on one component).
pub const COMPONENT_RTP: u8 = 1;

/// Maximum local preference (single homed interface, no ordering).
const MAX_LOCAL_PREF: u16 = u16::MAX;

// Shifts of the RFC 8445 §5.1.2.1 priority formula.
const TYPE_PREF_SHIFT: u32 = 24;
const LOCAL_PREF_SHIFT: u32 = 8;
const COMPONENT_OFFSET: u32 = 256;

/// One ICE candidate, local or remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: String,
    pub component: u8,
    pub transport: String,
    pub priority: u32,
    pub address: SocketAddr,
    pub cand_type: CandidateType,
}

impl Candidate {
    /// A local host candidate with computed foundation and priority.
    #[must_use]
    pub fn host(address: SocketAddr) -> Self {
        let cand_type = CandidateType::Host;
        Self {
            foundation: calculate_foundation(cand_type, "udp", address.ip()),
            component: COMPONENT_RTP,
            transport: "udp".to_owned(),
            priority: calculate_priority(cand_type, MAX_LOCAL_PREF, COMPONENT_RTP),
            address,
            cand_type,
        }
    }

    /// The `a=candidate:` attribute value for this candidate.
    #[must_use]
    pub fn to_attribute_value(&self) -> String {
        format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.transport,
            self.priority,
            self.address.ip(),
            self.address.port(),
            self.cand_type
        )
    }
}

/// Foundation per RFC 8445 §5.1.1.3: equal for candidates of the same
/// type, base address and transport.
fn calculate_foundation(cand_type: CandidateType, transport: &str, base_ip: IpAddr) -> String {
    let mut hasher = DefaultHasher::new();
    format!("{cand_type}-{base_ip}-{transport}").hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Candidate priority per RFC 8445 §5.1.2.1.
#[must_use]
pub fn calculate_priority(cand_type: CandidateType, local_pref: u16, component_id: u8) -> u32 {
    (1 << TYPE_PREF_SHIFT) * cand_type.preference()
        + (1 << LOCAL_PREF_SHIFT) * u32::from(local_pref)
        + (COMPONENT_OFFSET - u32::from(component_id))
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_attribute_value())
    }
}

impl FromStr for Candidate {
    type Err = ();

    /// Parses an `a=candidate:` attribute value, e.g.
    /// `842163049 1 udp 1677729535 192.0.2.1 40000 typ host generation 0`.
    /// Trailing extension tokens are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        if tokens.len() < 8 {
            return Err(());
        }
        let ip: IpAddr = tokens[4].parse().map_err(|_| ())?;
        let port: u16 = tokens[5].parse().map_err(|_| ())?;
        if tokens[6] != "typ" {
            return Err(());
        }
        Ok(Self {
            foundation: tokens[0].to_owned(),
            component: tokens[1].parse().map_err(|_| ())?,
            transport: tokens[2].to_ascii_lowercase(),
            priority: tokens[3].parse().map_err(|_| ())?,
            address: SocketAddr::new(ip, port),
            cand_type: tokens[7].parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn host_candidate_attribute_shape() {
        let c = Candidate::host("192.0.2.1:40000".parse().unwrap());
        let attr = c.to_attribute_value();
        assert!(attr.contains(" 1 udp "));
        assert!(attr.contains("192.0.2.1 40000 typ host"));
    }

    #[test]
    fn parse_browser_candidate_line() {
        let c: Candidate = "842163049 1 udp 1677729535 192.0.2.7 43210 typ srflx raddr 0.0.0.0 rport 0 generation 0"
            .parse()
            .unwrap();
        assert_eq!(c.foundation, "842163049");
        assert_eq!(c.priority, 1_677_729_535);
        assert_eq!(c.address, "192.0.2.7:43210".parse().unwrap());
        assert_eq!(c.cand_type, CandidateType::ServerReflexive);
    }

    #[test]
    fn candidate_roundtrip() {
        let c = Candidate::host("10.0.0.5:5000".parse().unwrap());
        let back: Candidate = c.to_attribute_value().parse().unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn malformed_lines_rejected() {
        assert!("1 1 udp 99 not-an-ip 5 typ host".parse::<Candidate>().is_err());
        assert!("1 1 udp 99 10.0.0.1 5 host".parse::<Candidate>().is_err());
        assert!("1 1 udp".parse::<Candidate>().is_err());
    }

    #[test]
    fn host_outranks_relay() {
        let host = calculate_priority(CandidateType::Host, MAX_LOCAL_PREF, 1);
        let relay = calculate_priority(CandidateType::Relayed, MAX_LOCAL_PREF, 1);
        assert!(host > relay);
    }

    #[test]
    fn foundation_depends_on_base_ip() {
        let a = Candidate::host("192.168.0.10:1000".parse().unwrap());
        let b = Candidate::host("192.168.0.11:1000".parse().unwrap());
        assert_ne!(a.foundation, b.foundation);
        // Same IP, different port: foundation is about the base, not the port.
        let c = Candidate::host("192.168.0.10:2000".parse().unwrap());
        assert_eq!(a.foundation, c.foundation);
    }
}
