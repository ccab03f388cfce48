/// RTP protocol version (RFC 3550 §5.1).
pub const RTP_VERSION: u8 = 2;
/// Fixed header length in bytes, before CSRCs and extensions.
pub const RTP_FIXED_HEADER_LEN: usize = 12;
/// Dynamic payload type the restreamer advertises for H.264.
pub const H264_PAYLOAD_TYPE: u8 = 96;
/// RTP clock rate for H.264 video (RFC 6184).
pub const H264_CLOCK_RATE: u32 = 90_000;
