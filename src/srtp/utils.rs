pub(super) type HmacSha1 = Hmac<Sha1>;
pub(super) type Aes128Ctr = Ctr128BE<Aes128>;

use aes::Aes128;
use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use hmac::Hmac;
use sha1::Sha1;

use crate::srtp::constants::{
    MASTER_SALT_LEN, SESSION_AUTH_LEN, SESSION_KEY_LEN, SESSION_SALT_LEN, SRTCP_LABEL_AUTH,
    SRTCP_LABEL_ENCRYPTION, SRTCP_LABEL_SALT, SRTP_LABEL_AUTH, SRTP_LABEL_ENCRYPTION,
    SRTP_LABEL_SALT,
};
use crate::srtp::endpoint_keys::SrtpEndpointKeys;
use crate::srtp::session_keys::SessionKeys;

/// Constant-time comparison so a tag check does not leak the position of
/// the first mismatching byte.
pub(super) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// AES-CM pseudo-random function of RFC 3711 §4.3.3: keystream over the
/// label-XORed master salt, truncated to the requested output length.
pub(super) fn aes_cm_prf(master_key: &[u8], master_salt_padded: &[u8; 16], label: u8, out: &mut [u8]) {
    let mut iv = *master_salt_padded;
    // The 48-bit key-id (label · 2^48) lands on byte 7 of the 112-bit salt.
    iv[7] ^= label;

    let mut cipher = Aes128Ctr::new(master_key.into(), &iv.into());
    out.fill(0);
    cipher.apply_keystream(out);
}

fn derive_with_labels(
    master: &SrtpEndpointKeys,
    labels: (u8, u8, u8),
) -> SessionKeys {
    let mut salt_pad = [0u8; 16];
    let take = master.master_salt.len().min(MASTER_SALT_LEN);
    salt_pad[..take].copy_from_slice(&master.master_salt[..take]);

    let mut enc_key = [0u8; SESSION_KEY_LEN];
    let mut auth_key = [0u8; SESSION_AUTH_LEN];
    let mut salt = [0u8; SESSION_SALT_LEN];

    aes_cm_prf(&master.master_key, &salt_pad, labels.0, &mut enc_key);
    aes_cm_prf(&master.master_key, &salt_pad, labels.1, &mut auth_key);
    aes_cm_prf(&master.master_key, &salt_pad, labels.2, &mut salt);

    SessionKeys {
        enc_key,
        auth_key,
        salt,
    }
}

/// Session keys for the RTP transform.
pub(super) fn derive_rtp_keys(master: &SrtpEndpointKeys) -> SessionKeys {
    derive_with_labels(
        master,
        (SRTP_LABEL_ENCRYPTION, SRTP_LABEL_AUTH, SRTP_LABEL_SALT),
    )
}

/// Session keys for the RTCP transform.
pub(super) fn derive_rtcp_keys(master: &SrtpEndpointKeys) -> SessionKeys {
    derive_with_labels(
        master,
        (SRTCP_LABEL_ENCRYPTION, SRTCP_LABEL_AUTH, SRTCP_LABEL_SALT),
    )
}

/// Per-packet IV of RFC 3711 §4.1.1:
/// salt[0..4] ‖ (salt[4..8] ⊕ ssrc) ‖ (salt[8..14] ⊕ index48) ‖ 00 00.
pub(super) fn compute_iv(session_salt: &[u8; SESSION_SALT_LEN], ssrc: u32, index: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..SESSION_SALT_LEN].copy_from_slice(session_salt);

    let ssrc_bytes = ssrc.to_be_bytes();
    for i in 0..4 {
        iv[4 + i] ^= ssrc_bytes[i];
    }

    let idx_full = index.to_be_bytes();
    for i in 0..6 {
        iv[8 + i] ^= idx_full[2 + i];
    }
    iv
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // RFC 3711 appendix B.3 key-derivation test vectors.
    #[test]
    fn key_derivation_known_answer() {
        let master = SrtpEndpointKeys {
            master_key: hex("E1F97A0D3E018BE0D64FA32C06DE4139"),
            master_salt: hex("0EC675AD498AFEEBB6960B3AABE6"),
        };
        let keys = derive_rtp_keys(&master);
        assert_eq!(keys.enc_key.to_vec(), hex("C61E7A93744F39EE10734AFE3FF7A087"));
        assert_eq!(keys.salt.to_vec(), hex("30CBBC08863D8C85D49DB34A9AE1"));
        assert_eq!(
            keys.auth_key.to_vec(),
            hex("CEBE321F6FF7716B6FD4AB49AF256A156D38BAA4")
        );
    }

    #[test]
    fn constant_time_eq_basic() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn iv_mixes_ssrc_and_index() {
        let salt = [0u8; SESSION_SALT_LEN];
        let iv = compute_iv(&salt, 0xDEAD_BEEF, 0x0001_0002_0003);
        assert_eq!(&iv[4..8], &0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(&iv[8..14], &[0x00, 0x01, 0x00, 0x02, 0x00, 0x03]);
        assert_eq!(&iv[14..16], &[0, 0]);
    }
}
