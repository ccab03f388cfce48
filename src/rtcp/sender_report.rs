use byteorder::{BigEndian, ByteOrder};

use super::common_header::CommonHeader;
use super::packet_type::PT_SR;
use super::report_block::{REPORT_BLOCK_LEN, ReportBlock};
use super::rtcp_error::RtcpError;

/// RTCP Sender Report (RFC 3550 §6.4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_seconds: u32,
    pub ntp_fraction: u32,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReportBlock>,
}

const SENDER_INFO_LEN: usize = 24; // ssrc + NTP + RTP ts + counts

impl SenderReport {
    /// Decodes the payload following a common header with `pt == 200`.
    ///
    /// # Errors
    /// [`RtcpError::LengthMismatch`] when the report count does not fit
    /// the declared packet length.
    pub fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<Self, RtcpError> {
        if payload.len() < SENDER_INFO_LEN {
            return Err(RtcpError::TooShort);
        }
        let expected = SENDER_INFO_LEN + usize::from(hdr.rc_or_fmt) * REPORT_BLOCK_LEN;
        if payload.len() < expected {
            return Err(RtcpError::LengthMismatch { pt: PT_SR });
        }

        let mut reports = Vec::with_capacity(usize::from(hdr.rc_or_fmt));
        let mut idx = SENDER_INFO_LEN;
        for _ in 0..hdr.rc_or_fmt {
            reports.push(ReportBlock::decode(&payload[idx..])?);
            idx += REPORT_BLOCK_LEN;
        }

        Ok(Self {
            ssrc: BigEndian::read_u32(&payload[0..4]),
            ntp_seconds: BigEndian::read_u32(&payload[4..8]),
            ntp_fraction: BigEndian::read_u32(&payload[8..12]),
            rtp_timestamp: BigEndian::read_u32(&payload[12..16]),
            packet_count: BigEndian::read_u32(&payload[16..20]),
            octet_count: BigEndian::read_u32(&payload[20..24]),
            reports,
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let words = (SENDER_INFO_LEN + self.reports.len() * REPORT_BLOCK_LEN) / 4;
        CommonHeader::new(self.reports.len() as u8, PT_SR, words as u16).encode_into(out);
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.extend_from_slice(&self.ntp_seconds.to_be_bytes());
        out.extend_from_slice(&self.ntp_fraction.to_be_bytes());
        out.extend_from_slice(&self.rtp_timestamp.to_be_bytes());
        out.extend_from_slice(&self.packet_count.to_be_bytes());
        out.extend_from_slice(&self.octet_count.to_be_bytes());
        for r in &self.reports {
            r.encode_into(out);
        }
    }
}
