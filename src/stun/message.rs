use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::attribute::{ATTR_FINGERPRINT, ATTR_MESSAGE_INTEGRITY, StunAttribute};
use super::stun_error::StunError;
use super::{FINGERPRINT_XOR, HEADER_LEN, MAGIC_COOKIE, METHOD_BINDING};

type HmacSha1 = Hmac<Sha1>;

/// Length of the MESSAGE-INTEGRITY TLV (header + 20-byte HMAC).
const MESSAGE_INTEGRITY_TLV_LEN: u16 = 4 + 20;
/// Length of the FINGERPRINT TLV (header + CRC-32).
const FINGERPRINT_TLV_LEN: u16 = 4 + 4;

/// STUN message classes, encoded in the two class bits of the type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl MessageClass {
    const fn bits(self) -> u16 {
        match self {
            Self::Request => 0x0000,
            Self::Indication => 0x0010,
            Self::SuccessResponse => 0x0100,
            Self::ErrorResponse => 0x0110,
        }
    }

    const fn from_type(message_type: u16) -> Self {
        match message_type & 0x0110 {
            0x0000 => Self::Request,
            0x0010 => Self::Indication,
            0x0100 => Self::SuccessResponse,
            _ => Self::ErrorResponse,
        }
    }
}

/// A decoded (or to-be-encoded) STUN message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    pub class: MessageClass,
    pub method: u16,
    pub transaction_id: [u8; 12],
    pub attributes: Vec<StunAttribute>,
}

impl StunMessage {
    #[must_use]
    pub fn new(class: MessageClass, method: u16, transaction_id: [u8; 12]) -> Self {
        Self {
            class,
            method,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn binding_request(transaction_id: [u8; 12]) -> Self {
        Self::new(MessageClass::Request, METHOD_BINDING, transaction_id)
    }

    #[must_use]
    pub fn binding_indication(transaction_id: [u8; 12]) -> Self {
        Self::new(MessageClass::Indication, METHOD_BINDING, transaction_id)
    }

    #[must_use]
    pub fn binding_success(transaction_id: [u8; 12]) -> Self {
        Self::new(MessageClass::SuccessResponse, METHOD_BINDING, transaction_id)
    }

    #[must_use]
    pub fn with_attribute(mut self, attr: StunAttribute) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Serialises the message. With `integrity_key` a MESSAGE-INTEGRITY
    /// attribute is appended (HMAC-SHA1 over the message up to but
    /// excluding it, with the length field already counting it); with
    /// `add_fingerprint` a FINGERPRINT attribute is appended last
    /// (CRC-32 of everything before it, XORed with 0x5354554e).
    #[must_use]
    pub fn encode(&self, integrity_key: Option<&[u8]>, add_fingerprint: bool) -> Vec<u8> {
        let message_type = (self.method & 0x0FEF) | self.class.bits();

        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(&message_type.to_be_bytes());
        buf.extend_from_slice(&[0, 0]); // length patched below
        buf.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buf.extend_from_slice(&self.transaction_id);

        for attr in &self.attributes {
            // Integrity and fingerprint only ever go through the dedicated
            // arguments so their offsets are computed correctly.
            if matches!(
                attr.attr_type(),
                ATTR_MESSAGE_INTEGRITY | ATTR_FINGERPRINT
            ) {
                continue;
            }
            let value = attr.encode_value(&self.transaction_id);
            buf.extend_from_slice(&attr.attr_type().to_be_bytes());
            buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
            buf.extend_from_slice(&value);
            while buf.len() % 4 != 0 {
                buf.push(0);
            }
        }

        if let Some(key) = integrity_key {
            let len_with_mi = (buf.len() - HEADER_LEN) as u16 + MESSAGE_INTEGRITY_TLV_LEN;
            BigEndian::write_u16(&mut buf[2..4], len_with_mi);
            let mac = hmac_sha1(key, &buf);
            buf.extend_from_slice(&ATTR_MESSAGE_INTEGRITY.to_be_bytes());
            buf.extend_from_slice(&20u16.to_be_bytes());
            buf.extend_from_slice(&mac);
        }

        if add_fingerprint {
            let len_with_fp = (buf.len() - HEADER_LEN) as u16 + FINGERPRINT_TLV_LEN;
            BigEndian::write_u16(&mut buf[2..4], len_with_fp);
            let crc = crc32(&buf) ^ FINGERPRINT_XOR;
            buf.extend_from_slice(&ATTR_FINGERPRINT.to_be_bytes());
            buf.extend_from_slice(&4u16.to_be_bytes());
            buf.extend_from_slice(&crc.to_be_bytes());
        } else {
            let final_len = (buf.len() - HEADER_LEN) as u16;
            BigEndian::write_u16(&mut buf[2..4], final_len);
        }

        buf
    }

    /// Parses and validates a STUN message. A FINGERPRINT attribute, when
    /// present, is checked here; MESSAGE-INTEGRITY is checked separately
    /// against the raw buffer via [`verify_integrity`].
    ///
    /// # Errors
    /// [`StunError`] on any structural violation or fingerprint mismatch.
    pub fn decode(buf: &[u8]) -> Result<Self, StunError> {
        if buf.len() < HEADER_LEN {
            return Err(StunError::TooShort);
        }
        if buf[0] & 0xC0 != 0 {
            return Err(StunError::NotStun);
        }
        if BigEndian::read_u32(&buf[4..8]) != MAGIC_COOKIE {
            return Err(StunError::NotStun);
        }
        let message_type = BigEndian::read_u16(&buf[0..2]);
        let length = usize::from(BigEndian::read_u16(&buf[2..4]));
        if length % 4 != 0 || HEADER_LEN + length != buf.len() {
            return Err(StunError::BadLength);
        }

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&buf[8..20]);

        let mut attributes = Vec::new();
        let mut idx = HEADER_LEN;
        while idx < buf.len() {
            if buf.len() < idx + 4 {
                return Err(StunError::TooShort);
            }
            let attr_type = BigEndian::read_u16(&buf[idx..idx + 2]);
            let value_len = usize::from(BigEndian::read_u16(&buf[idx + 2..idx + 4]));
            let value_start = idx + 4;
            let value = buf
                .get(value_start..value_start + value_len)
                .ok_or(StunError::TooShort)?;

            if attr_type == ATTR_FINGERPRINT {
                let sent = BigEndian::read_u32(value);
                let computed = crc32(&buf[..idx]) ^ FINGERPRINT_XOR;
                if sent != computed {
                    return Err(StunError::FingerprintMismatch);
                }
            }

            attributes.push(StunAttribute::decode(attr_type, value, &transaction_id)?);
            idx = value_start + value_len;
            while idx % 4 != 0 && idx < buf.len() {
                idx += 1;
            }
        }

        Ok(Self {
            class: MessageClass::from_type(message_type),
            method: message_type & 0x0FEF,
            transaction_id,
            attributes,
        })
    }

    /// First attribute matching `pred`, if any.
    pub fn find<P: Fn(&StunAttribute) -> bool>(&self, pred: P) -> Option<&StunAttribute> {
        self.attributes.iter().find(|a| pred(a))
    }

    #[must_use]
    pub fn has_use_candidate(&self) -> bool {
        self.find(|a| matches!(a, StunAttribute::UseCandidate))
            .is_some()
    }

    #[must_use]
    pub fn priority(&self) -> Option<u32> {
        self.find(|a| matches!(a, StunAttribute::Priority(_)))
            .and_then(|a| match a {
                StunAttribute::Priority(p) => Some(*p),
                _ => None,
            })
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.find(|a| matches!(a, StunAttribute::Username(_)))
            .and_then(|a| match a {
                StunAttribute::Username(u) => Some(u.as_str()),
                _ => None,
            })
    }

    #[must_use]
    pub fn xor_mapped_address(&self) -> Option<std::net::SocketAddr> {
        self.find(|a| matches!(a, StunAttribute::XorMappedAddress(_)))
            .and_then(|a| match a {
                StunAttribute::XorMappedAddress(addr) => Some(*addr),
                _ => None,
            })
    }
}

/// Verifies the MESSAGE-INTEGRITY of a raw STUN datagram against
/// `key` (the ice-pwd of whichever side the message authenticates to).
///
/// Recomputes the HMAC over the message up to the attribute, with the
/// length field patched to the value it had when the MAC was produced.
#[must_use]
pub fn verify_integrity(raw: &[u8], key: &[u8]) -> bool {
    let Some((mi_offset, sent_mac)) = find_message_integrity(raw) else {
        return false;
    };
    let mut prefix = raw[..mi_offset].to_vec();
    let patched_len = (mi_offset - HEADER_LEN) as u16 + MESSAGE_INTEGRITY_TLV_LEN;
    BigEndian::write_u16(&mut prefix[2..4], patched_len);
    let computed = hmac_sha1(key, &prefix);

    let mut diff = 0u8;
    for (a, b) in computed.iter().zip(sent_mac.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

/// Offset of the MESSAGE-INTEGRITY TLV and its MAC value, walking the
/// raw attribute list.
fn find_message_integrity(raw: &[u8]) -> Option<(usize, &[u8])> {
    if raw.len() < HEADER_LEN {
        return None;
    }
    let mut idx = HEADER_LEN;
    while idx + 4 <= raw.len() {
        let attr_type = BigEndian::read_u16(&raw[idx..idx + 2]);
        let value_len = usize::from(BigEndian::read_u16(&raw[idx + 2..idx + 4]));
        let value_end = idx + 4 + value_len;
        if value_end > raw.len() {
            return None;
        }
        if attr_type == ATTR_MESSAGE_INTEGRITY && value_len == 20 {
            return Some((idx, &raw[idx + 4..value_end]));
        }
        idx = value_end;
        while idx % 4 != 0 && idx < raw.len() {
            idx += 1;
        }
    }
    None
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    if let Ok(mut mac) = HmacSha1::new_from_slice(key) {
        mac.update(data);
        out.copy_from_slice(&mac.finalize().into_bytes());
    }
    out
}

// IEEE CRC-32, table-driven; STUN is the only consumer in this crate.
const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0usize;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in data {
        crc = (crc >> 8) ^ CRC_TABLE[usize::from((crc ^ u32::from(b)) as u8)];
    }
    !crc
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::net::SocketAddr;

    const TID: [u8; 12] = [0xB7, 0xE7, 0xA7, 1, 2, 3, 4, 5, 6, 7, 8, 9];

    #[test]
    fn crc32_known_answer() {
        // CRC-32 of "123456789" is the classic check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn plain_request_roundtrip() {
        let msg = StunMessage::binding_request(TID)
            .with_attribute(StunAttribute::Priority(0x6E00_1EFF))
            .with_attribute(StunAttribute::Username("remote:local".to_owned()));
        let wire = msg.encode(None, false);
        let back = StunMessage::decode(&wire).unwrap();
        assert_eq!(back.class, MessageClass::Request);
        assert_eq!(back.method, METHOD_BINDING);
        assert_eq!(back.transaction_id, TID);
        assert_eq!(back.priority(), Some(0x6E00_1EFF));
        assert_eq!(back.username(), Some("remote:local"));
    }

    #[test]
    fn fingerprint_is_validated_on_decode() {
        let msg = StunMessage::binding_request(TID);
        let mut wire = msg.encode(None, true);
        assert!(StunMessage::decode(&wire).is_ok());

        let n = wire.len();
        wire[n - 1] ^= 0xFF;
        assert!(matches!(
            StunMessage::decode(&wire),
            Err(StunError::FingerprintMismatch)
        ));
    }

    #[test]
    fn integrity_verifies_with_right_key_only() {
        let key = b"the-ice-password";
        let msg = StunMessage::binding_request(TID)
            .with_attribute(StunAttribute::Username("a:b".to_owned()));
        let wire = msg.encode(Some(key), true);

        // Decode still works (integrity rides along as an attribute).
        let decoded = StunMessage::decode(&wire).unwrap();
        assert!(decoded
            .find(|a| matches!(a, StunAttribute::MessageIntegrity(_)))
            .is_some());

        assert!(verify_integrity(&wire, key));
        assert!(!verify_integrity(&wire, b"wrong-password"));
    }

    #[test]
    fn integrity_covers_attributes() {
        let key = b"pwd";
        let msg = StunMessage::binding_request(TID).with_attribute(StunAttribute::Priority(7));
        let mut wire = msg.encode(Some(key), false);
        // Flip a bit inside the PRIORITY value.
        wire[HEADER_LEN + 5] ^= 0x01;
        assert!(!verify_integrity(&wire, key));
    }

    #[test]
    fn success_response_carries_mapped_address() {
        let addr: SocketAddr = "203.0.113.9:3478".parse().unwrap();
        let msg = StunMessage::binding_success(TID)
            .with_attribute(StunAttribute::XorMappedAddress(addr));
        let wire = msg.encode(Some(b"pw"), true);
        let back = StunMessage::decode(&wire).unwrap();
        assert_eq!(back.class, MessageClass::SuccessResponse);
        assert_eq!(back.xor_mapped_address(), Some(addr));
    }

    #[test]
    fn length_mismatch_rejected() {
        let msg = StunMessage::binding_request(TID);
        let mut wire = msg.encode(None, false);
        wire[3] = wire[3].wrapping_add(4); // claim one more word
        assert!(matches!(
            StunMessage::decode(&wire),
            Err(StunError::BadLength)
        ));
    }

    #[test]
    fn non_stun_first_byte_rejected() {
        // 0x80.. looks like RTP, never STUN.
        let mut wire = StunMessage::binding_request(TID).encode(None, false);
        wire[0] |= 0x80;
        assert!(matches!(StunMessage::decode(&wire), Err(StunError::NotStun)));
    }
}
