use std::fmt;
use std::io;

use openssl::error::ErrorStack;

#[derive(Debug)]
pub enum DtlsError {
    Io(io::Error),
    Ssl(String),
    Handshake(String),
    /// The handshake did not complete within its deadline.
    HandshakeTimeout,
    /// The presented certificate does not hash to the pinned fingerprint.
    FingerprintMismatch,
    /// The peer presented no certificate, or one we could not digest.
    CertificateInvalid,
    /// The peer sent a fatal alert during the handshake.
    PeerAlert(String),
    NoSrtpProfile,
    KeyExport(String),
}

impl fmt::Display for DtlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Ssl(s) => write!(f, "OpenSSL error: {s}"),
            Self::Handshake(s) => write!(f, "Handshake error: {s}"),
            Self::HandshakeTimeout => write!(f, "DTLS handshake timed out"),
            Self::FingerprintMismatch => write!(f, "remote certificate fingerprint mismatch"),
            Self::CertificateInvalid => write!(f, "remote certificate invalid"),
            Self::PeerAlert(s) => write!(f, "peer alert: {s}"),
            Self::NoSrtpProfile => write!(f, "No SRTP profile negotiated"),
            Self::KeyExport(s) => write!(f, "Key export failed: {s}"),
        }
    }
}

impl std::error::Error for DtlsError {}

impl From<io::Error> for DtlsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ErrorStack> for DtlsError {
    fn from(e: ErrorStack) -> Self {
        Self::Ssl(format!("{e}"))
    }
}
