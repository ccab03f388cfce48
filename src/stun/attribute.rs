use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use byteorder::{BigEndian, ByteOrder};

use super::{MAGIC_COOKIE, stun_error::StunError};

// Attribute types (RFC 5389 §18.2 + RFC 8445 §16.1).
pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const ATTR_PRIORITY: u16 = 0x0024;
pub const ATTR_USE_CANDIDATE: u16 = 0x0025;
pub const ATTR_FINGERPRINT: u16 = 0x8028;
pub const ATTR_ICE_CONTROLLED: u16 = 0x8029;
pub const ATTR_ICE_CONTROLLING: u16 = 0x802A;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// The STUN attributes the ICE agent reads and writes. Anything else is
/// preserved as `Unknown` so fingerprint offsets stay correct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunAttribute {
    Username(String),
    XorMappedAddress(SocketAddr),
    Priority(u32),
    UseCandidate,
    IceControlling(u64),
    IceControlled(u64),
    ErrorCode { code: u16, reason: String },
    /// Raw HMAC as read off the wire; verification happens on the raw
    /// buffer, not through this value.
    MessageIntegrity([u8; 20]),
    Fingerprint(u32),
    Unknown { attr_type: u16, value: Vec<u8> },
}

impl StunAttribute {
    #[must_use]
    pub fn attr_type(&self) -> u16 {
        match self {
            Self::Username(_) => ATTR_USERNAME,
            Self::XorMappedAddress(_) => ATTR_XOR_MAPPED_ADDRESS,
            Self::Priority(_) => ATTR_PRIORITY,
            Self::UseCandidate => ATTR_USE_CANDIDATE,
            Self::IceControlling(_) => ATTR_ICE_CONTROLLING,
            Self::IceControlled(_) => ATTR_ICE_CONTROLLED,
            Self::ErrorCode { .. } => ATTR_ERROR_CODE,
            Self::MessageIntegrity(_) => ATTR_MESSAGE_INTEGRITY,
            Self::Fingerprint(_) => ATTR_FINGERPRINT,
            Self::Unknown { attr_type, .. } => *attr_type,
        }
    }

    /// Serialises the attribute value (without the 4-byte TLV header).
    /// `transaction_id` is needed for IPv6 XOR-MAPPED-ADDRESS.
    #[must_use]
    pub fn encode_value(&self, transaction_id: &[u8; 12]) -> Vec<u8> {
        match self {
            Self::Username(u) => u.as_bytes().to_vec(),
            Self::XorMappedAddress(addr) => encode_xor_addr(*addr, transaction_id),
            Self::Priority(p) => p.to_be_bytes().to_vec(),
            Self::UseCandidate => Vec::new(),
            Self::IceControlling(tb) | Self::IceControlled(tb) => tb.to_be_bytes().to_vec(),
            Self::ErrorCode { code, reason } => {
                let mut v = vec![0, 0, (code / 100) as u8, (code % 100) as u8];
                v.extend_from_slice(reason.as_bytes());
                v
            }
            Self::MessageIntegrity(mac) => mac.to_vec(),
            Self::Fingerprint(crc) => crc.to_be_bytes().to_vec(),
            Self::Unknown { value, .. } => value.clone(),
        }
    }

    /// Parses one attribute value.
    ///
    /// # Errors
    /// [`StunError::BadAttribute`] when the value is shorter than its type
    /// requires.
    pub fn decode(
        attr_type: u16,
        value: &[u8],
        transaction_id: &[u8; 12],
    ) -> Result<Self, StunError> {
        let bad = || StunError::BadAttribute(attr_type);
        match attr_type {
            ATTR_USERNAME => Ok(Self::Username(
                String::from_utf8_lossy(value).into_owned(),
            )),
            ATTR_XOR_MAPPED_ADDRESS => decode_xor_addr(value, transaction_id)
                .map(Self::XorMappedAddress)
                .ok_or_else(bad),
            ATTR_PRIORITY => {
                if value.len() != 4 {
                    return Err(bad());
                }
                Ok(Self::Priority(BigEndian::read_u32(value)))
            }
            ATTR_USE_CANDIDATE => Ok(Self::UseCandidate),
            ATTR_ICE_CONTROLLING => {
                if value.len() != 8 {
                    return Err(bad());
                }
                Ok(Self::IceControlling(BigEndian::read_u64(value)))
            }
            ATTR_ICE_CONTROLLED => {
                if value.len() != 8 {
                    return Err(bad());
                }
                Ok(Self::IceControlled(BigEndian::read_u64(value)))
            }
            ATTR_ERROR_CODE => {
                if value.len() < 4 {
                    return Err(bad());
                }
                let code = u16::from(value[2]) * 100 + u16::from(value[3]);
                Ok(Self::ErrorCode {
                    code,
                    reason: String::from_utf8_lossy(&value[4..]).into_owned(),
                })
            }
            ATTR_MESSAGE_INTEGRITY => {
                let mac: [u8; 20] = value.try_into().map_err(|_| bad())?;
                Ok(Self::MessageIntegrity(mac))
            }
            ATTR_FINGERPRINT => {
                if value.len() != 4 {
                    return Err(bad());
                }
                Ok(Self::Fingerprint(BigEndian::read_u32(value)))
            }
            _ => Ok(Self::Unknown {
                attr_type,
                value: value.to_vec(),
            }),
        }
    }
}

fn encode_xor_addr(addr: SocketAddr, transaction_id: &[u8; 12]) -> Vec<u8> {
    let xport = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    match addr.ip() {
        IpAddr::V4(ip) => {
            let xip = u32::from(ip) ^ MAGIC_COOKIE;
            let mut v = vec![0, FAMILY_IPV4];
            v.extend_from_slice(&xport.to_be_bytes());
            v.extend_from_slice(&xip.to_be_bytes());
            v
        }
        IpAddr::V6(ip) => {
            let mut mask = [0u8; 16];
            mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            mask[4..].copy_from_slice(transaction_id);
            let mut oct = ip.octets();
            for (b, m) in oct.iter_mut().zip(mask.iter()) {
                *b ^= m;
            }
            let mut v = vec![0, FAMILY_IPV6];
            v.extend_from_slice(&xport.to_be_bytes());
            v.extend_from_slice(&oct);
            v
        }
    }
}

fn decode_xor_addr(value: &[u8], transaction_id: &[u8; 12]) -> Option<SocketAddr> {
    if value.len() < 8 {
        return None;
    }
    let family = value[1];
    let port = BigEndian::read_u16(&value[2..4]) ^ (MAGIC_COOKIE >> 16) as u16;
    match family {
        FAMILY_IPV4 => {
            let ip = Ipv4Addr::from(BigEndian::read_u32(&value[4..8]) ^ MAGIC_COOKIE);
            Some(SocketAddr::new(IpAddr::V4(ip), port))
        }
        FAMILY_IPV6 => {
            if value.len() < 20 {
                return None;
            }
            let mut mask = [0u8; 16];
            mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            mask[4..].copy_from_slice(transaction_id);
            let mut oct = [0u8; 16];
            oct.copy_from_slice(&value[4..20]);
            for (b, m) in oct.iter_mut().zip(mask.iter()) {
                *b ^= m;
            }
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(oct)), port))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    const TID: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    #[test]
    fn xor_mapped_address_roundtrip_v4() {
        let addr: SocketAddr = "192.0.2.1:40000".parse().unwrap();
        let attr = StunAttribute::XorMappedAddress(addr);
        let value = attr.encode_value(&TID);
        // The wire value must not contain the plain port or address.
        assert_ne!(BigEndian::read_u16(&value[2..4]), addr.port());
        let back = StunAttribute::decode(ATTR_XOR_MAPPED_ADDRESS, &value, &TID).unwrap();
        assert_eq!(back, attr);
    }

    #[test]
    fn xor_mapped_address_roundtrip_v6() {
        let addr: SocketAddr = "[2001:db8::1]:5000".parse().unwrap();
        let attr = StunAttribute::XorMappedAddress(addr);
        let value = attr.encode_value(&TID);
        let back = StunAttribute::decode(ATTR_XOR_MAPPED_ADDRESS, &value, &TID).unwrap();
        assert_eq!(back, attr);
    }

    #[test]
    fn error_code_roundtrip() {
        let attr = StunAttribute::ErrorCode {
            code: 487,
            reason: "Role Conflict".to_owned(),
        };
        let value = attr.encode_value(&TID);
        assert_eq!(value[2], 4);
        assert_eq!(value[3], 87);
        let back = StunAttribute::decode(ATTR_ERROR_CODE, &value, &TID).unwrap();
        assert_eq!(back, attr);
    }

    #[test]
    fn truncated_priority_rejected() {
        assert!(matches!(
            StunAttribute::decode(ATTR_PRIORITY, &[0, 1], &TID),
            Err(StunError::BadAttribute(ATTR_PRIORITY))
        ));
    }

    #[test]
    fn unknown_attribute_is_preserved() {
        let back = StunAttribute::decode(0x7777, &[9, 9], &TID).unwrap();
        assert_eq!(
            back,
            StunAttribute::Unknown {
                attr_type: 0x7777,
                value: vec![9, 9]
            }
        );
    }
}
