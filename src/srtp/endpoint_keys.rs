/// Master key material for one endpoint (direction) of a DTLS-SRTP
/// session, as split out of the keying-material export.
#[derive(Debug, Clone)]
pub struct SrtpEndpointKeys {
    pub master_key: Vec<u8>,
    pub master_salt: Vec<u8>,
}

impl SrtpEndpointKeys {
    /// Overwrites the key material with zeroes. Called once session keys
    /// are derived; the vectors stay allocated but hold nothing.
    pub fn zero(&mut self) {
        self.master_key.fill(0);
        self.master_salt.fill(0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpProfile {
    Aes128CmHmacSha1_80,
}

/// Both directions of a negotiated SRTP session, oriented from the local
/// endpoint's point of view.
#[derive(Debug, Clone)]
pub struct SrtpSessionConfig {
    pub profile: SrtpProfile,
    pub outbound: SrtpEndpointKeys,
    pub inbound: SrtpEndpointKeys,
}
