use std::fmt;

/// Which side of the DTLS handshake this peer plays, negotiated through
/// the SDP `setup` attribute (RFC 5763): our offer says `actpass`, the
/// answer's `active`/`passive` fixes the roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    Client,
    Server,
}

impl DtlsRole {
    /// Local role implied by the remote answer's `setup` value.
    /// An `actpass` answer is a spec violation; treat the remote as
    /// passive so the handshake still has exactly one client.
    #[must_use]
    pub fn from_remote_setup(setup: &str) -> Self {
        match setup {
            "active" => Self::Server,
            _ => Self::Client,
        }
    }
}

impl fmt::Display for DtlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn active_answer_makes_us_server() {
        assert_eq!(DtlsRole::from_remote_setup("active"), DtlsRole::Server);
        assert_eq!(DtlsRole::from_remote_setup("passive"), DtlsRole::Client);
        assert_eq!(DtlsRole::from_remote_setup("actpass"), DtlsRole::Client);
    }
}
