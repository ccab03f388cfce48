//! First-byte demultiplexing of the shared media socket (RFC 7983).
//! STUN, DTLS and SRTP/SRTCP ride the same UDP 5-tuple.

/// Where an inbound datagram belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    Stun,
    Dtls,
    Rtp,
    Drop,
}

/// Classifies by first byte: 0..=3 STUN, 20..=63 DTLS, 128..=191
/// RTP/RTCP, anything else is dropped.
#[must_use]
pub fn classify(data: &[u8]) -> PacketClass {
    match data.first() {
        Some(0..=3) => PacketClass::Stun,
        Some(20..=63) => PacketClass::Dtls,
        Some(128..=191) => PacketClass::Rtp,
        _ => PacketClass::Drop,
    }
}

/// Outcome of handing a datagram to the agent: STUN is consumed
/// internally, the rest is routed back to the owner.
#[derive(Debug, PartialEq, Eq)]
pub enum Demuxed {
    Consumed,
    Dtls(Vec<u8>),
    Rtp(Vec<u8>),
    Dropped,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn classification_ranges() {
        assert_eq!(classify(&[0x00, 0x01]), PacketClass::Stun);
        assert_eq!(classify(&[0x01]), PacketClass::Stun);
        assert_eq!(classify(&[22]), PacketClass::Dtls); // handshake record
        assert_eq!(classify(&[23]), PacketClass::Dtls); // application data
        assert_eq!(classify(&[0x80]), PacketClass::Rtp);
        assert_eq!(classify(&[0xBF]), PacketClass::Rtp);
        assert_eq!(classify(&[0x04]), PacketClass::Drop);
        assert_eq!(classify(&[0xC0]), PacketClass::Drop);
        assert_eq!(classify(&[]), PacketClass::Drop);
    }
}
