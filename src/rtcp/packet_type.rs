/// RTCP protocol version (RFC 3550 §6.4.1).
pub const RTCP_VERSION: u8 = 2;

// Assigned packet types.
pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;
pub const PT_RTPFB: u8 = 205;
pub const PT_PSFB: u8 = 206;

// Feedback message types (FMT field).
pub const FMT_GENERIC_NACK: u8 = 1;
pub const FMT_PLI: u8 = 1;

/// True if a first payload-type byte of a muxed datagram is RTCP rather
/// than RTP (RFC 5761 §4).
#[must_use]
pub fn is_rtcp_payload_type(second_byte: u8) -> bool {
    (PT_SR..=PT_PSFB).contains(&second_byte)
}
