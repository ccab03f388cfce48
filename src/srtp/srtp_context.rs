use std::sync::Arc;

use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use hmac::Mac;

use crate::log::log_sink::LogSink;
use crate::srtp::constants::{
    AUTH_TAG_LEN, MASTER_KEY_LEN, MASTER_SALT_LEN, SRTCP_E_BIT, SRTCP_INDEX_LEN,
};
use crate::srtp::endpoint_keys::SrtpEndpointKeys;
use crate::srtp::replay_window::ReplayWindow;
use crate::srtp::session_keys::SessionKeys;
use crate::srtp::srtp_error::SrtpError;
use crate::srtp::utils::{
    Aes128Ctr, HmacSha1, compute_iv, constant_time_eq, derive_rtcp_keys, derive_rtp_keys,
};
use crate::{sink_trace, sink_warn};

/// Lifecycle of a cryptographic context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpContextState {
    /// Holds master material, nothing derived yet.
    Fresh,
    /// Session keys derived, master material zeroed.
    Derived,
    /// Transforms allowed.
    Active,
    /// Keys wiped; the context is dead.
    Closed,
}

/// Per-direction SRTP/SRTCP context for a single SSRC
/// (AES-128-CM + HMAC-SHA1-80).
///
/// Single-writer by design: the owning peer's send loop or receive loop
/// is the only caller, so there is no internal locking.
pub struct SrtpContext {
    logger: Arc<dyn LogSink>,
    state: SrtpContextState,
    master: Option<SrtpEndpointKeys>,
    rtp_keys: Option<SessionKeys>,
    rtcp_keys: Option<SessionKeys>,
    // RTP stream state.
    roc: u32,
    last_seq: Option<u16>,
    replay: ReplayWindow,
    // RTCP stream state.
    rtcp_index: u32,
    rtcp_replay: ReplayWindow,
}

impl SrtpContext {
    /// A fresh context holding master material.
    #[must_use]
    pub fn new(logger: Arc<dyn LogSink>, master: SrtpEndpointKeys) -> Self {
        Self {
            logger,
            state: SrtpContextState::Fresh,
            master: Some(master),
            rtp_keys: None,
            rtcp_keys: None,
            roc: 0,
            last_seq: None,
            replay: ReplayWindow::new(),
            rtcp_index: 0,
            rtcp_replay: ReplayWindow::new(),
        }
    }

    /// Derives RTP and RTCP session keys and zeroes the master material.
    ///
    /// # Errors
    /// [`SrtpError::BadState`] unless the context is Fresh;
    /// [`SrtpError::BadKeyLength`] for malformed master material.
    pub fn derive_session_keys(&mut self) -> Result<(), SrtpError> {
        if self.state != SrtpContextState::Fresh {
            return Err(SrtpError::BadState);
        }
        let mut master = self.master.take().ok_or(SrtpError::BadState)?;
        if master.master_key.len() != MASTER_KEY_LEN || master.master_salt.len() != MASTER_SALT_LEN {
            self.master = Some(master);
            return Err(SrtpError::BadKeyLength);
        }

        self.rtp_keys = Some(derive_rtp_keys(&master));
        self.rtcp_keys = Some(derive_rtcp_keys(&master));
        master.zero();

        self.state = SrtpContextState::Derived;
        Ok(())
    }

    /// Arms the context for transforms.
    ///
    /// # Errors
    /// [`SrtpError::BadState`] unless the context is Derived.
    pub fn activate(&mut self) -> Result<(), SrtpError> {
        if self.state != SrtpContextState::Derived {
            return Err(SrtpError::BadState);
        }
        self.state = SrtpContextState::Active;
        Ok(())
    }

    /// Convenience: new + derive + activate in one step.
    ///
    /// # Errors
    /// See [`Self::derive_session_keys`].
    pub fn active(logger: Arc<dyn LogSink>, master: SrtpEndpointKeys) -> Result<Self, SrtpError> {
        let mut ctx = Self::new(logger, master);
        ctx.derive_session_keys()?;
        ctx.activate()?;
        Ok(ctx)
    }

    #[must_use]
    pub fn state(&self) -> SrtpContextState {
        self.state
    }

    /// Current rollover counter (sender side advances it on seq wrap).
    #[must_use]
    pub fn roc(&self) -> u32 {
        self.roc
    }

    /// Wipes all key material and closes the context.
    pub fn close(&mut self) {
        if let Some(master) = &mut self.master {
            master.zero();
        }
        self.master = None;
        if let Some(keys) = &mut self.rtp_keys {
            keys.zero();
        }
        if let Some(keys) = &mut self.rtcp_keys {
            keys.zero();
        }
        self.state = SrtpContextState::Closed;
    }

    /// Encrypts the payload of the RTP packet in place and appends the
    /// 10-byte auth tag. The header is authenticated but not encrypted.
    ///
    /// # Errors
    /// [`SrtpError::NotActive`] outside the Active state, or a structural
    /// error for malformed input.
    pub fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if self.state != SrtpContextState::Active {
            return Err(SrtpError::NotActive);
        }
        if packet.len() < 12 {
            return Err(SrtpError::TooShort);
        }

        let seq = BigEndian::read_u16(&packet[2..4]);
        let ssrc = BigEndian::read_u32(&packet[8..12]);

        // Sender-side ROC: the outbound counter is monotonic, so a drop
        // past zero is exactly the 0xFFFF -> 0x0000 wrap.
        if let Some(last) = self.last_seq {
            if seq < last && last.wrapping_sub(seq) > 0x8000 {
                self.roc = self.roc.wrapping_add(1);
            }
        }
        self.last_seq = Some(seq);

        let index = (u64::from(self.roc) << 16) | u64::from(seq);
        let header_len = rtp_header_len(packet)?;

        let keys = self.rtp_keys.as_ref().ok_or(SrtpError::NotActive)?;
        let iv = compute_iv(&keys.salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(&keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut packet[header_len..]);

        let tag = rtp_tag(keys, packet, self.roc)?;
        packet.extend_from_slice(&tag);

        sink_trace!(
            self.logger,
            "[SRTP] protected ssrc={:#x} seq={} roc={} len={}",
            ssrc,
            seq,
            self.roc,
            packet.len()
        );
        Ok(())
    }

    /// Verifies and decrypts an SRTP packet in place, removing the tag.
    ///
    /// # Errors
    /// [`SrtpError::ReplayRejected`], [`SrtpError::AuthFailed`], or a
    /// structural error.
    pub fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if self.state != SrtpContextState::Active {
            return Err(SrtpError::NotActive);
        }
        if packet.len() < 12 + AUTH_TAG_LEN {
            return Err(SrtpError::TooShort);
        }

        let tag_start = packet.len() - AUTH_TAG_LEN;
        let (content, received_tag) = packet.split_at(tag_start);

        let seq = BigEndian::read_u16(&content[2..4]);
        let ssrc = BigEndian::read_u32(&content[8..12]);

        let roc = self.estimate_roc(seq);
        let index = (u64::from(roc) << 16) | u64::from(seq);

        if self.replay.is_replay(index) {
            sink_warn!(
                self.logger,
                "[SRTP] replay rejected ssrc={:#x} seq={} index={}",
                ssrc,
                seq,
                index
            );
            return Err(SrtpError::ReplayRejected);
        }

        let keys = self.rtp_keys.as_ref().ok_or(SrtpError::NotActive)?;
        let expected = rtp_tag(keys, content, roc)?;
        if !constant_time_eq(&expected, received_tag) {
            sink_warn!(
                self.logger,
                "[SRTP] auth failed ssrc={:#x} seq={} roc={}",
                ssrc,
                seq,
                roc
            );
            return Err(SrtpError::AuthFailed);
        }

        packet.truncate(tag_start);
        let header_len = rtp_header_len(packet)?;
        let iv = compute_iv(&keys.salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(&keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut packet[header_len..]);

        self.roc = roc;
        self.last_seq = Some(seq);
        self.replay.record(index);
        Ok(())
    }

    /// Encrypts an RTCP packet in place (everything after the first 8
    /// bytes) and appends the E+index word and the auth tag.
    ///
    /// # Errors
    /// [`SrtpError::NotActive`] outside the Active state, or
    /// [`SrtpError::TooShort`].
    pub fn protect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if self.state != SrtpContextState::Active {
            return Err(SrtpError::NotActive);
        }
        if packet.len() < 8 {
            return Err(SrtpError::TooShort);
        }

        let ssrc = BigEndian::read_u32(&packet[4..8]);
        let index = self.rtcp_index;
        self.rtcp_index = (self.rtcp_index + 1) & 0x7FFF_FFFF;

        let keys = self.rtcp_keys.as_ref().ok_or(SrtpError::NotActive)?;
        let iv = compute_iv(&keys.salt, ssrc, u64::from(index));
        let mut cipher = Aes128Ctr::new(&keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut packet[8..]);

        packet.extend_from_slice(&(SRTCP_E_BIT | index).to_be_bytes());

        let mut mac =
            HmacSha1::new_from_slice(&keys.auth_key).map_err(|_| SrtpError::BadKeyLength)?;
        mac.update(packet);
        let full = mac.finalize().into_bytes();
        packet.extend_from_slice(&full[..AUTH_TAG_LEN]);
        Ok(())
    }

    /// Verifies and decrypts an SRTCP packet in place, removing the
    /// trailer. Returns the plain compound RTCP bytes in `packet`.
    ///
    /// # Errors
    /// [`SrtpError::ReplayRejected`], [`SrtpError::AuthFailed`], or a
    /// structural error.
    pub fn unprotect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if self.state != SrtpContextState::Active {
            return Err(SrtpError::NotActive);
        }
        if packet.len() < 8 + SRTCP_INDEX_LEN + AUTH_TAG_LEN {
            return Err(SrtpError::TooShort);
        }

        let tag_start = packet.len() - AUTH_TAG_LEN;
        let (content, received_tag) = packet.split_at(tag_start);
        let index_word = BigEndian::read_u32(&content[content.len() - SRTCP_INDEX_LEN..]);
        let encrypted = index_word & SRTCP_E_BIT != 0;
        let index = index_word & !SRTCP_E_BIT;

        if self.rtcp_replay.is_replay(u64::from(index)) {
            return Err(SrtpError::ReplayRejected);
        }

        let keys = self.rtcp_keys.as_ref().ok_or(SrtpError::NotActive)?;
        let mut mac =
            HmacSha1::new_from_slice(&keys.auth_key).map_err(|_| SrtpError::BadKeyLength)?;
        mac.update(content);
        let full = mac.finalize().into_bytes();
        if !constant_time_eq(&full[..AUTH_TAG_LEN], received_tag) {
            return Err(SrtpError::AuthFailed);
        }

        packet.truncate(tag_start - SRTCP_INDEX_LEN);
        if encrypted {
            let ssrc = BigEndian::read_u32(&packet[4..8]);
            let iv = compute_iv(&keys.salt, ssrc, u64::from(index));
            let mut cipher = Aes128Ctr::new(&keys.enc_key.into(), &iv.into());
            cipher.apply_keystream(&mut packet[8..]);
        }

        self.rtcp_replay.record(u64::from(index));
        Ok(())
    }

    /// RFC 3711 §3.3.1 rollover guess from the incoming sequence number.
    fn estimate_roc(&self, seq: u16) -> u32 {
        let Some(last) = self.last_seq else {
            return self.roc;
        };
        if last < 0x8000 {
            if i32::from(seq) - i32::from(last) > 0x8000 {
                self.roc.wrapping_sub(1)
            } else {
                self.roc
            }
        } else if i32::from(last) - 0x8000 > i32::from(seq) {
            self.roc.wrapping_add(1)
        } else {
            self.roc
        }
    }
}

/// Header length including CSRCs and extension; errors if it overruns.
fn rtp_header_len(packet: &[u8]) -> Result<usize, SrtpError> {
    if packet.len() < 12 {
        return Err(SrtpError::TooShort);
    }
    let vpxcc = packet[0];
    let cc = usize::from(vpxcc & 0x0F);
    let has_ext = (vpxcc & 0x10) != 0;

    let mut len = 12 + cc * 4;
    if has_ext {
        if packet.len() < len + 4 {
            return Err(SrtpError::BadHeader);
        }
        let ext_words = usize::from(BigEndian::read_u16(&packet[len + 2..len + 4]));
        len += 4 + ext_words * 4;
    }
    if packet.len() < len {
        return Err(SrtpError::BadHeader);
    }
    Ok(len)
}

/// HMAC-SHA1 over (packet ‖ ROC), truncated to 80 bits.
fn rtp_tag(keys: &SessionKeys, content: &[u8], roc: u32) -> Result<[u8; AUTH_TAG_LEN], SrtpError> {
    let mut mac = HmacSha1::new_from_slice(&keys.auth_key).map_err(|_| SrtpError::BadKeyLength)?;
    mac.update(content);
    mac.update(&roc.to_be_bytes());
    let full = mac.finalize().into_bytes();
    let mut tag = [0u8; AUTH_TAG_LEN];
    tag.copy_from_slice(&full[..AUTH_TAG_LEN]);
    Ok(tag)
}
