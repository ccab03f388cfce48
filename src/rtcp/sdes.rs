use byteorder::{BigEndian, ByteOrder};

use super::common_header::CommonHeader;
use super::packet_type::PT_SDES;
use super::rtcp_error::RtcpError;

/// SDES item types we care to name; everything else rides as `Other`.
pub const SDES_CNAME: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesItem {
    pub kind: u8,
    pub text: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesChunk {
    pub ssrc: u32,
    pub items: Vec<SdesItem>,
}

impl SdesChunk {
    /// CNAME text of this chunk, if present and valid UTF-8.
    #[must_use]
    pub fn cname(&self) -> Option<&str> {
        self.items
            .iter()
            .find(|i| i.kind == SDES_CNAME)
            .and_then(|i| std::str::from_utf8(&i.text).ok())
    }
}

/// RTCP Source Description (RFC 3550 §6.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdes {
    pub chunks: Vec<SdesChunk>,
}

impl Sdes {
    /// Decodes the payload following a common header with `pt == 202`.
    ///
    /// # Errors
    /// [`RtcpError::BadSdesItem`] when an item runs past its chunk, or a
    /// chunk past the packet.
    pub fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<Self, RtcpError> {
        let mut chunks = Vec::with_capacity(usize::from(hdr.rc_or_fmt));
        let mut idx = 0usize;

        for _ in 0..hdr.rc_or_fmt {
            if payload.len() < idx + 4 {
                return Err(RtcpError::BadSdesItem);
            }
            let ssrc = BigEndian::read_u32(&payload[idx..idx + 4]);
            idx += 4;

            let mut items = Vec::new();
            loop {
                let kind = *payload.get(idx).ok_or(RtcpError::BadSdesItem)?;
                idx += 1;
                if kind == 0 {
                    // Chunk terminator; items are padded to the next word.
                    while idx % 4 != 0 {
                        if idx >= payload.len() {
                            break;
                        }
                        idx += 1;
                    }
                    break;
                }
                let len = usize::from(*payload.get(idx).ok_or(RtcpError::BadSdesItem)?);
                idx += 1;
                let text = payload
                    .get(idx..idx + len)
                    .ok_or(RtcpError::BadSdesItem)?
                    .to_vec();
                idx += len;
                items.push(SdesItem { kind, text });
            }
            chunks.push(SdesChunk { ssrc, items });
        }

        Ok(Self { chunks })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        for chunk in &self.chunks {
            body.extend_from_slice(&chunk.ssrc.to_be_bytes());
            for item in &chunk.items {
                body.push(item.kind);
                body.push(item.text.len() as u8);
                body.extend_from_slice(&item.text);
            }
            body.push(0); // terminator
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }
        let words = (body.len() / 4) as u16;
        CommonHeader::new(self.chunks.len() as u8, PT_SDES, words).encode_into(out);
        out.extend_from_slice(&body);
    }
}
