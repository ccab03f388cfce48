use super::bye::Bye;
use super::common_header::CommonHeader;
use super::feedback::{GenericNack, PictureLossIndication};
use super::packet_type::{
    FMT_GENERIC_NACK, FMT_PLI, PT_APP, PT_BYE, PT_PSFB, PT_RR, PT_RTPFB, PT_SDES, PT_SR,
};
use super::receiver_report::ReceiverReport;
use super::rtcp_error::RtcpError;
use super::sdes::Sdes;
use super::sender_report::SenderReport;

/// The union of supported RTCP packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    Sr(SenderReport),
    Rr(ReceiverReport),
    Sdes(Sdes),
    Bye(Bye),
    Nack(GenericNack),          // Transport FB (205/FMT=1)
    Pli(PictureLossIndication), // Payload FB (206/FMT=1)
    /// A structurally valid sub-report of a type (or FMT) we do not model.
    Unhandled { pt: u8, fmt: u8 },
}

impl RtcpPacket {
    /// Decode a *compound* RTCP buffer into individual packets.
    ///
    /// Every sub-report's length field is validated; decoding stops at the
    /// first inconsistency and the whole compound is rejected.
    ///
    /// # Errors
    /// The [`RtcpError`] describing the first inconsistency.
    pub fn decode_compound(buf: &[u8]) -> Result<Vec<RtcpPacket>, RtcpError> {
        let mut out = Vec::new();
        let mut idx = 0usize;
        while idx + 4 <= buf.len() {
            let (hdr, total) = CommonHeader::decode(&buf[idx..])?;
            let payload = &buf[idx + 4..idx + total];

            let pkt = match hdr.pt {
                PT_SR => RtcpPacket::Sr(SenderReport::decode(&hdr, payload)?),
                PT_RR => RtcpPacket::Rr(ReceiverReport::decode(&hdr, payload)?),
                PT_SDES => RtcpPacket::Sdes(Sdes::decode(&hdr, payload)?),
                PT_BYE => RtcpPacket::Bye(Bye::decode(&hdr, payload)?),
                PT_RTPFB if hdr.rc_or_fmt == FMT_GENERIC_NACK => {
                    RtcpPacket::Nack(GenericNack::decode(payload)?)
                }
                PT_PSFB if hdr.rc_or_fmt == FMT_PLI => {
                    RtcpPacket::Pli(PictureLossIndication::decode(payload)?)
                }
                // APP and unmodelled feedback formats ride along without
                // killing the rest of the compound.
                PT_APP | PT_RTPFB | PT_PSFB => RtcpPacket::Unhandled {
                    pt: hdr.pt,
                    fmt: hdr.rc_or_fmt,
                },
                other => return Err(RtcpError::UnknownPacketType(other)),
            };
            out.push(pkt);
            idx += total;
        }
        if idx != buf.len() {
            // trailing garbage / partial packet
            return Err(RtcpError::TooShort);
        }
        Ok(out)
    }

    /// Encode a compound RTCP packet (concatenation of packets).
    /// `Unhandled` entries are skipped.
    #[must_use]
    pub fn encode_compound(pkts: &[RtcpPacket]) -> Vec<u8> {
        let mut out = Vec::new();
        for pkt in pkts {
            match pkt {
                RtcpPacket::Sr(sr) => sr.encode_into(&mut out),
                RtcpPacket::Rr(rr) => rr.encode_into(&mut out),
                RtcpPacket::Sdes(sdes) => sdes.encode_into(&mut out),
                RtcpPacket::Bye(bye) => bye.encode_into(&mut out),
                RtcpPacket::Nack(nack) => nack.encode_into(&mut out),
                RtcpPacket::Pli(pli) => pli.encode_into(&mut out),
                RtcpPacket::Unhandled { .. } => {}
            }
        }
        out
    }
}
