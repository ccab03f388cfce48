//! Transport-layer and payload-specific feedback (RFC 4585). The
//! restreamer never generates feedback; these are decoded from the
//! browser for logging.

use byteorder::{BigEndian, ByteOrder};

use super::common_header::CommonHeader;
use super::packet_type::{PT_PSFB, PT_RTPFB};
use super::rtcp_error::RtcpError;

/// Picture Loss Indication (PSFB, FMT 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureLossIndication {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
}

impl PictureLossIndication {
    /// # Errors
    /// [`RtcpError::LengthMismatch`] if the fixed 8-byte FCI prefix is
    /// missing.
    pub fn decode(payload: &[u8]) -> Result<Self, RtcpError> {
        if payload.len() < 8 {
            return Err(RtcpError::LengthMismatch { pt: PT_PSFB });
        }
        Ok(Self {
            sender_ssrc: BigEndian::read_u32(&payload[0..4]),
            media_ssrc: BigEndian::read_u32(&payload[4..8]),
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        CommonHeader::new(1, PT_PSFB, 2).encode_into(out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
    }
}

/// One lost-packet entry of a Generic NACK: a packet id and a bitmask of
/// the following 16 sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackEntry {
    pub packet_id: u16,
    pub bitmask: u16,
}

/// Generic NACK (RTPFB, FMT 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericNack {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub entries: Vec<NackEntry>,
}

impl GenericNack {
    /// # Errors
    /// [`RtcpError::LengthMismatch`] if the FCI is truncated or not a
    /// multiple of 4 bytes.
    pub fn decode(payload: &[u8]) -> Result<Self, RtcpError> {
        if payload.len() < 8 || (payload.len() - 8) % 4 != 0 {
            return Err(RtcpError::LengthMismatch { pt: PT_RTPFB });
        }
        let mut entries = Vec::with_capacity((payload.len() - 8) / 4);
        let mut idx = 8usize;
        while idx < payload.len() {
            entries.push(NackEntry {
                packet_id: BigEndian::read_u16(&payload[idx..idx + 2]),
                bitmask: BigEndian::read_u16(&payload[idx + 2..idx + 4]),
            });
            idx += 4;
        }
        Ok(Self {
            sender_ssrc: BigEndian::read_u32(&payload[0..4]),
            media_ssrc: BigEndian::read_u32(&payload[4..8]),
            entries,
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let words = (8 + self.entries.len() * 4) / 4;
        CommonHeader::new(1, PT_RTPFB, words as u16).encode_into(out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        for e in &self.entries {
            out.extend_from_slice(&e.packet_id.to_be_bytes());
            out.extend_from_slice(&e.bitmask.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn pli_roundtrip() {
        let pli = PictureLossIndication {
            sender_ssrc: 1,
            media_ssrc: 2,
        };
        let mut wire = Vec::new();
        pli.encode_into(&mut wire);
        let (_, total) = CommonHeader::decode(&wire).unwrap();
        assert_eq!(total, wire.len());
        assert_eq!(PictureLossIndication::decode(&wire[4..]).unwrap(), pli);
    }

    #[test]
    fn nack_roundtrip_and_truncation() {
        let nack = GenericNack {
            sender_ssrc: 3,
            media_ssrc: 4,
            entries: vec![
                NackEntry {
                    packet_id: 100,
                    bitmask: 0b101,
                },
                NackEntry {
                    packet_id: 200,
                    bitmask: 0,
                },
            ],
        };
        let mut wire = Vec::new();
        nack.encode_into(&mut wire);
        assert_eq!(GenericNack::decode(&wire[4..]).unwrap(), nack);
        assert!(matches!(
            GenericNack::decode(&wire[4..wire.len() - 2]),
            Err(RtcpError::LengthMismatch { pt: PT_RTPFB })
        ));
    }
}
