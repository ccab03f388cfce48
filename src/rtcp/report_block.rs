use byteorder::{BigEndian, ByteOrder};

use super::rtcp_error::RtcpError;

/// Reception report block carried by SR and RR packets (RFC 3550 §6.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    /// Signed 24-bit cumulative number of packets lost.
    pub cumulative_lost: i32,
    pub ext_highest_seq: u32,
    pub jitter: u32,
    pub last_sr: u32,
    pub delay_since_last_sr: u32,
}

/// Encoded size of one report block.
pub const REPORT_BLOCK_LEN: usize = 24;

impl ReportBlock {
    /// # Errors
    /// [`RtcpError::TooShort`] if fewer than 24 bytes remain.
    pub fn decode(buf: &[u8]) -> Result<Self, RtcpError> {
        if buf.len() < REPORT_BLOCK_LEN {
            return Err(RtcpError::TooShort);
        }
        let raw_lost = BigEndian::read_u32(&buf[4..8]);
        let mut cumulative_lost = (raw_lost & 0x00FF_FFFF) as i32;
        if cumulative_lost & 0x0080_0000 != 0 {
            cumulative_lost -= 0x0100_0000; // sign-extend 24 bits
        }
        Ok(Self {
            ssrc: BigEndian::read_u32(&buf[0..4]),
            fraction_lost: buf[4],
            cumulative_lost,
            ext_highest_seq: BigEndian::read_u32(&buf[8..12]),
            jitter: BigEndian::read_u32(&buf[12..16]),
            last_sr: BigEndian::read_u32(&buf[16..20]),
            delay_since_last_sr: BigEndian::read_u32(&buf[20..24]),
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        let lost24 = (self.cumulative_lost as u32) & 0x00FF_FFFF;
        out.extend_from_slice(&((u32::from(self.fraction_lost) << 24) | lost24).to_be_bytes());
        out.extend_from_slice(&self.ext_highest_seq.to_be_bytes());
        out.extend_from_slice(&self.jitter.to_be_bytes());
        out.extend_from_slice(&self.last_sr.to_be_bytes());
        out.extend_from_slice(&self.delay_since_last_sr.to_be_bytes());
    }
}
