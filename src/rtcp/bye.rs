use byteorder::{BigEndian, ByteOrder};

use super::common_header::CommonHeader;
use super::packet_type::PT_BYE;
use super::rtcp_error::RtcpError;

/// RTCP Goodbye (RFC 3550 §6.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bye {
    pub ssrcs: Vec<u32>,
    pub reason: Option<String>,
}

impl Bye {
    /// Decodes the payload following a common header with `pt == 203`.
    ///
    /// # Errors
    /// [`RtcpError::LengthMismatch`] if the SSRC list exceeds the packet;
    /// [`RtcpError::BadReason`] for a reason running past the end.
    pub fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<Self, RtcpError> {
        let count = usize::from(hdr.rc_or_fmt);
        if payload.len() < count * 4 {
            return Err(RtcpError::LengthMismatch { pt: PT_BYE });
        }
        let mut ssrcs = Vec::with_capacity(count);
        let mut idx = 0usize;
        for _ in 0..count {
            ssrcs.push(BigEndian::read_u32(&payload[idx..idx + 4]));
            idx += 4;
        }

        let mut reason = None;
        if idx < payload.len() {
            let len = usize::from(payload[idx]);
            idx += 1;
            let text = payload.get(idx..idx + len).ok_or(RtcpError::BadReason)?;
            reason = Some(String::from_utf8_lossy(text).into_owned());
        }

        Ok(Self { ssrcs, reason })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        for ssrc in &self.ssrcs {
            body.extend_from_slice(&ssrc.to_be_bytes());
        }
        if let Some(reason) = &self.reason {
            body.push(reason.len() as u8);
            body.extend_from_slice(reason.as_bytes());
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }
        let words = (body.len() / 4) as u16;
        CommonHeader::new(self.ssrcs.len() as u8, PT_BYE, words).encode_into(out);
        out.extend_from_slice(&body);
    }
}
