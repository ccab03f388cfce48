use crate::srtp::constants::{SESSION_AUTH_LEN, SESSION_KEY_LEN, SESSION_SALT_LEN};

/// Session keys for one transform (RTP or RTCP) of one direction.
pub struct SessionKeys {
    pub(crate) enc_key: [u8; SESSION_KEY_LEN],
    pub(crate) auth_key: [u8; SESSION_AUTH_LEN],
    pub(crate) salt: [u8; SESSION_SALT_LEN],
}

impl SessionKeys {
    /// Wipes the derived keys. Used when the owning context closes.
    pub(crate) fn zero(&mut self) {
        self.enc_key.fill(0);
        self.auth_key.fill(0);
        self.salt.fill(0);
    }
}
