use byteorder::{BigEndian, ByteOrder};

use super::config::{RTP_FIXED_HEADER_LEN, RTP_VERSION};
use super::rtp_error::RtpError;
use super::rtp_header_extension::RtpHeaderExtension;

/// RTP fixed header plus CSRC list and optional extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8, // must be 2
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8, // 7 bits
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    pub header_extension: Option<RtpHeaderExtension>,
}

impl RtpHeader {
    #[must_use]
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs: Vec::new(),
            header_extension: None,
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    #[must_use]
    pub fn with_csrcs(mut self, csrcs: Vec<u32>) -> Self {
        self.csrcs = csrcs;
        self
    }

    #[must_use]
    pub fn with_extension(mut self, ext: Option<RtpHeaderExtension>) -> Self {
        self.extension = ext.is_some();
        self.header_extension = ext;
        self
    }
}

/// Borrowed view over a validated RTP header.
///
/// The hot path parses every ingress datagram; this view reads the fixed
/// fields and computes the header length without copying the CSRC list or
/// extension data out of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeaderView {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc_count: u8,
    /// Bytes from the start of the packet to the first payload byte.
    pub header_len: usize,
}

impl RtpHeaderView {
    /// Validates and reads the header of `buf`.
    ///
    /// Rejects version ≠ 2 and any declared header length (CSRCs plus
    /// extension) that exceeds the packet length.
    ///
    /// # Errors
    /// [`RtpError`] describing the first malformation found.
    pub fn parse(buf: &[u8]) -> Result<Self, RtpError> {
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
        let csrc_count = vpxcc & 0x0F;

        let m_pt = buf[1];
        let marker = (m_pt >> 7) != 0;
        let payload_type = m_pt & 0x7F;

        let sequence_number = BigEndian::read_u16(&buf[2..4]);
        let timestamp = BigEndian::read_u32(&buf[4..8]);
        let ssrc = BigEndian::read_u32(&buf[8..12]);

        let mut header_len = RTP_FIXED_HEADER_LEN + usize::from(csrc_count) * 4;
        if buf.len() < header_len {
            return Err(RtpError::CsrcCountMismatch {
                expected: usize::from(csrc_count),
                buf_left: buf.len().saturating_sub(RTP_FIXED_HEADER_LEN),
            });
        }

        if extension {
            if buf.len() < header_len + 4 {
                return Err(RtpError::HeaderExtensionTooShort);
            }
            let ext_words = BigEndian::read_u16(&buf[header_len + 2..header_len + 4]);
            header_len += 4 + usize::from(ext_words) * 4;
            if buf.len() < header_len {
                return Err(RtpError::HeaderExtensionTooShort);
            }
        }

        Ok(Self {
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc_count,
            header_len,
        })
    }

    /// Payload slice of `buf`, excluding any trailing padding.
    ///
    /// `buf` must be the same packet this view was parsed from.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8], RtpError> {
        let mut end = buf.len();
        if self.padding {
            if end <= self.header_len {
                return Err(RtpError::PaddingTooShort);
            }
            let pad = usize::from(buf[end - 1]);
            if pad == 0 || pad > end - self.header_len {
                return Err(RtpError::PaddingTooShort);
            }
            end -= pad;
        }
        buf.get(self.header_len..end).ok_or(RtpError::TooShort)
    }
}
