pub mod udp_rtp_source;
pub use udp_rtp_source::{IngressPacket, RtpHandler, SourceError, UdpRtpSource};
