//! DTLS 1.2 for WebRTC: handshake procedures, SRTP key export, identity
//! and fingerprint handling.
pub mod certificate;
pub mod datagram_channel;
pub mod dtls_error;
pub mod dtls_role;
pub mod runtime;
pub use certificate::{DtlsIdentity, RemoteFingerprint};
pub use datagram_channel::DatagramChannel;
pub use dtls_error::DtlsError;
pub use dtls_role::DtlsRole;
pub use runtime::run_dtls_handshake;
