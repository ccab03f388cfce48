//! Owned RTP packet model + encode/decode per RFC 3550.
//! No session logic here (no jitter calc, no RTX); immutable packet
//! structs and safe serialization only.

use byteorder::{BigEndian, ByteOrder};

use super::config::{RTP_FIXED_HEADER_LEN, RTP_VERSION};
use super::rtp_error::RtpError;
use super::rtp_header::RtpHeader;
use super::rtp_header_extension::RtpHeaderExtension;

/// Complete RTP packet (header + payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    /// Payload without any trailing padding bytes. If padding was present,
    /// `padding_bytes` records how much was removed during decode.
    pub payload: Vec<u8>,
    /// Count of padding bytes (from the last byte) if the P bit was set.
    pub padding_bytes: u8,
}

impl RtpPacket {
    #[must_use]
    pub fn new(header: RtpHeader, payload: Vec<u8>) -> Self {
        Self {
            header,
            payload,
            padding_bytes: 0,
        }
    }

    /// Convenience constructor for the common no-CSRC, no-extension case.
    #[must_use]
    pub fn simple(
        payload_type: u8,
        marker: bool,
        seq: u16,
        ts: u32,
        ssrc: u32,
        payload: Vec<u8>,
    ) -> Self {
        let header = RtpHeader::new(payload_type, seq, ts, ssrc).with_marker(marker);
        Self::new(header, payload)
    }

    /// Encode into a fresh Vec<u8> (network byte order).
    ///
    /// The P bit on the wire follows `padding_bytes`, not `header.padding`.
    ///
    /// # Errors
    /// [`RtpError::HeaderExtensionTooLong`] if the extension does not fit
    /// its 16-bit word count.
    pub fn encode(&self) -> Result<Vec<u8>, RtpError> {
        let mut out = Vec::with_capacity(
            RTP_FIXED_HEADER_LEN + self.header.csrcs.len() * 4 + self.payload.len() + 8,
        );

        let cc = (self.header.csrcs.len() & 0x0F) as u8;
        let has_ext = self.header.header_extension.is_some();
        let has_pad = self.padding_bytes > 0;
        let vpxcc =
            (self.header.version & 0b11) << 6 | (has_pad as u8) << 5 | (has_ext as u8) << 4 | cc;
        out.push(vpxcc);
        out.push(((self.header.marker as u8) << 7) | (self.header.payload_type & 0x7F));

        let mut word = [0u8; 4];
        BigEndian::write_u16(&mut word[..2], self.header.sequence_number);
        out.extend_from_slice(&word[..2]);
        BigEndian::write_u32(&mut word, self.header.timestamp);
        out.extend_from_slice(&word);
        BigEndian::write_u32(&mut word, self.header.ssrc);
        out.extend_from_slice(&word);

        for csrc in &self.header.csrcs {
            BigEndian::write_u32(&mut word, *csrc);
            out.extend_from_slice(&word);
        }

        if let Some(ext) = &self.header.header_extension {
            // RFC 3550: 16-bit profile, 16-bit length in 32-bit words.
            let words = ext.data.len().div_ceil(4);
            if words > usize::from(u16::MAX) {
                return Err(RtpError::HeaderExtensionTooLong);
            }
            BigEndian::write_u16(&mut word[..2], ext.profile);
            out.extend_from_slice(&word[..2]);
            BigEndian::write_u16(&mut word[..2], words as u16);
            out.extend_from_slice(&word[..2]);
            out.extend_from_slice(&ext.data);
            let pad = (4 - (ext.data.len() % 4)) % 4;
            out.extend(std::iter::repeat_n(0u8, pad));
        }

        out.extend_from_slice(&self.payload);

        if has_pad {
            // (padding_bytes - 1) filler bytes, then the count itself.
            if self.padding_bytes > 1 {
                out.extend(std::iter::repeat_n(0u8, (self.padding_bytes - 1) as usize));
            }
            out.push(self.padding_bytes);
        }

        Ok(out)
    }

    /// Decode a single RTP packet from `buf`.
    ///
    /// # Errors
    /// [`RtpError`] describing the first malformation found.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpError> {
        if buf.len() < RTP_FIXED_HEADER_LEN {
            return Err(RtpError::TooShort);
        }

        let vpxcc = buf[0];
        let version = (vpxcc >> 6) & 0b11;
        if version != RTP_VERSION {
            return Err(RtpError::BadVersion(version));
        }
        let padding = ((vpxcc >> 5) & 1) != 0;
        let extension = ((vpxcc >> 4) & 1) != 0;
        let cc = usize::from(vpxcc & 0x0F);

        let m_pt = buf[1];
        let marker = (m_pt >> 7) != 0;
        let payload_type = m_pt & 0x7F;

        let sequence_number = BigEndian::read_u16(&buf[2..4]);
        let timestamp = BigEndian::read_u32(&buf[4..8]);
        let ssrc = BigEndian::read_u32(&buf[8..12]);

        let mut idx = RTP_FIXED_HEADER_LEN;

        if buf.len() < idx + cc * 4 {
            return Err(RtpError::CsrcCountMismatch {
                expected: cc,
                buf_left: buf.len().saturating_sub(idx),
            });
        }
        let mut csrcs = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrcs.push(BigEndian::read_u32(&buf[idx..idx + 4]));
            idx += 4;
        }

        let mut header_extension: Option<RtpHeaderExtension> = None;
        if extension {
            if buf.len() < idx + 4 {
                return Err(RtpError::HeaderExtensionTooShort);
            }
            let profile = BigEndian::read_u16(&buf[idx..idx + 2]);
            let ext_len = usize::from(BigEndian::read_u16(&buf[idx + 2..idx + 4])) * 4;
            idx += 4;
            if buf.len() < idx + ext_len {
                return Err(RtpError::HeaderExtensionTooShort);
            }
            header_extension = Some(RtpHeaderExtension {
                profile,
                data: buf[idx..idx + ext_len].to_vec(),
            });
            idx += ext_len;
        }

        let mut payload_end = buf.len();
        let mut padding_bytes = 0u8;
        if padding {
            if payload_end == idx {
                return Err(RtpError::PaddingTooShort);
            }
            let pad = buf[payload_end - 1];
            if pad == 0 || usize::from(pad) > payload_end - idx {
                return Err(RtpError::PaddingTooShort);
            }
            padding_bytes = pad;
            payload_end -= usize::from(pad);
        }

        let payload = buf
            .get(idx..payload_end)
            .ok_or(RtpError::Invalid)?
            .to_vec();

        Ok(Self {
            header: RtpHeader {
                version,
                padding,
                extension,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
                csrcs,
                header_extension,
            },
            payload,
            padding_bytes,
        })
    }

    // Convenience getters
    #[must_use]
    pub fn payload_type(&self) -> u8 {
        self.header.payload_type
    }
    #[must_use]
    pub fn marker(&self) -> bool {
        self.header.marker
    }
    #[must_use]
    pub fn seq(&self) -> u16 {
        self.header.sequence_number
    }
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }
    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }
}
