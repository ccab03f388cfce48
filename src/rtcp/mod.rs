pub mod bye;
pub mod common_header;
pub mod feedback;
pub mod packet_type;
pub mod receiver_report;
pub mod report_block;
pub mod rtcp;
pub mod rtcp_error;
pub mod sdes;
pub mod sender_report;
pub use rtcp::RtcpPacket;
pub use rtcp_error::RtcpError;
