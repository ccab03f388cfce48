pub mod config;
pub mod rtp_error;
pub mod rtp_header;
pub mod rtp_header_extension;
pub mod rtp_packet;
pub use rtp_error::RtpError;
pub use rtp_header::{RtpHeader, RtpHeaderView};
pub use rtp_packet::RtpPacket;
