use byteorder::{BigEndian, ByteOrder};

use super::common_header::CommonHeader;
use super::packet_type::PT_RR;
use super::report_block::{REPORT_BLOCK_LEN, ReportBlock};
use super::rtcp_error::RtcpError;

/// RTCP Receiver Report (RFC 3550 §6.4.2). This is the report browsers
/// keep sending for a sendonly stream; the restreamer ingests it for
/// diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReportBlock>,
}

impl ReceiverReport {
    /// Decodes the payload following a common header with `pt == 201`.
    ///
    /// # Errors
    /// [`RtcpError::LengthMismatch`] when the report count does not fit
    /// the declared packet length.
    pub fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<Self, RtcpError> {
        if payload.len() < 4 {
            return Err(RtcpError::TooShort);
        }
        let expected = 4 + usize::from(hdr.rc_or_fmt) * REPORT_BLOCK_LEN;
        if payload.len() < expected {
            return Err(RtcpError::LengthMismatch { pt: PT_RR });
        }

        let mut reports = Vec::with_capacity(usize::from(hdr.rc_or_fmt));
        let mut idx = 4;
        for _ in 0..hdr.rc_or_fmt {
            reports.push(ReportBlock::decode(&payload[idx..])?);
            idx += REPORT_BLOCK_LEN;
        }
        Ok(Self {
            ssrc: BigEndian::read_u32(&payload[0..4]),
            reports,
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let words = (4 + self.reports.len() * REPORT_BLOCK_LEN) / 4;
        CommonHeader::new(self.reports.len() as u8, PT_RR, words as u16).encode_into(out);
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for r in &self.reports {
            r.encode_into(out);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn roundtrip_empty_and_two_reports() {
        for n in [0usize, 2] {
            let rr = ReceiverReport {
                ssrc: 9,
                reports: (0..n)
                    .map(|i| ReportBlock {
                        ssrc: i as u32,
                        fraction_lost: 1,
                        cumulative_lost: 2,
                        ext_highest_seq: 3,
                        jitter: 4,
                        last_sr: 5,
                        delay_since_last_sr: 6,
                    })
                    .collect(),
            };
            let mut wire = Vec::new();
            rr.encode_into(&mut wire);
            let (hdr, _) = CommonHeader::decode(&wire).unwrap();
            assert_eq!(ReceiverReport::decode(&hdr, &wire[4..]).unwrap(), rr);
        }
    }
}
