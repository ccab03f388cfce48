use crate::dtls::RemoteFingerprint;
use crate::ice::Candidate;
use crate::rtp::config::H264_PAYLOAD_TYPE;
use crate::sdp::{MediaKind, Sdp};

use super::peer_error::AnswerRejection;

/// Transport profile every answer must agree to.
const EXPECTED_PROTO: &str = "UDP/TLS/RTP/SAVP";

/// Everything the peer needs out of a remote answer.
#[derive(Debug, Clone)]
pub struct RemoteAnswer {
    pub ufrag: String,
    pub pwd: String,
    pub fingerprint: RemoteFingerprint,
    /// The remote's `setup` value; decides our DTLS role.
    pub setup: String,
    pub candidates: Vec<Candidate>,
    pub ice_lite: bool,
}

impl RemoteAnswer {
    /// Parses and validates an answer against the offer this crate
    /// generates (one sendonly H.264 section, DTLS-SRTP transport).
    ///
    /// # Errors
    /// The [`AnswerRejection`] naming the first problem found.
    pub fn parse(text: &str) -> Result<Self, AnswerRejection> {
        let sdp = Sdp::parse(text).map_err(|_| AnswerRejection::MalformedSdp)?;

        let video: Vec<_> = sdp
            .media
            .iter()
            .filter(|m| m.kind == MediaKind::Video)
            .collect();
        if video.is_empty() {
            return Err(AnswerRejection::NoMatchingMedia);
        }
        let media = video
            .iter()
            .find(|m| m.fmts.iter().any(|f| f == &H264_PAYLOAD_TYPE.to_string()))
            .ok_or(AnswerRejection::NoMatchingMedia)?;
        if !media.proto.eq_ignore_ascii_case(EXPECTED_PROTO) {
            return Err(AnswerRejection::UnsupportedTransport);
        }

        let fingerprint_attr = sdp
            .media_or_session_attr(media, "fingerprint")
            .ok_or(AnswerRejection::FingerprintMissing)?;
        let fingerprint = RemoteFingerprint::parse(fingerprint_attr)
            .filter(|fp| fp.digest().is_some())
            .ok_or(AnswerRejection::FingerprintInvalid)?;

        let ufrag = sdp
            .media_or_session_attr(media, "ice-ufrag")
            .ok_or(AnswerRejection::MalformedSdp)?
            .to_owned();
        let pwd = sdp
            .media_or_session_attr(media, "ice-pwd")
            .ok_or(AnswerRejection::MalformedSdp)?
            .to_owned();

        // Browsers always answer actpass offers with an explicit setup;
        // default to active (the RFC 5763 recommendation) if absent.
        let setup = sdp
            .media_or_session_attr(media, "setup")
            .unwrap_or("active")
            .to_owned();

        let candidates = media
            .attr_values("candidate")
            .into_iter()
            .filter_map(|v| v.parse::<Candidate>().ok())
            .collect();

        let ice_lite = sdp.has_attr("ice-lite") || media.has_attr("ice-lite");

        Ok(Self {
            ufrag,
            pwd,
            fingerprint,
            setup,
            candidates,
            ice_lite,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn answer_text(
        m_line: &str,
        fingerprint: Option<&str>,
        setup: Option<&str>,
        extra: &str,
    ) -> String {
        let mut s = String::from(
            "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
        );
        s.push_str(&format!("{m_line}\r\n"));
        s.push_str("a=mid:v\r\n");
        s.push_str("a=ice-ufrag:frag0123456789ab\r\n");
        s.push_str("a=ice-pwd:pwd0123456789pwd0123456789pwd0123456789pwd01234\r\n");
        if let Some(fp) = fingerprint {
            s.push_str(&format!("a=fingerprint:{fp}\r\n"));
        }
        if let Some(st) = setup {
            s.push_str(&format!("a=setup:{st}\r\n"));
        }
        s.push_str(extra);
        s
    }

    const FP: &str = "sha-256 AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99";

    #[test]
    fn good_answer_parses() {
        let text = answer_text(
            "m=video 9 UDP/TLS/RTP/SAVP 96",
            Some(FP),
            Some("active"),
            "a=candidate:1 1 udp 1677729535 192.0.2.7 43210 typ host\r\n",
        );
        let answer = RemoteAnswer::parse(&text).unwrap();
        assert_eq!(answer.ufrag, "frag0123456789ab");
        assert_eq!(answer.setup, "active");
        assert_eq!(answer.candidates.len(), 1);
        assert!(!answer.ice_lite);
        assert_eq!(answer.fingerprint.algorithm, "sha-256");
    }

    #[test]
    fn audio_only_answer_is_no_matching_media() {
        let text = answer_text("m=audio 9 UDP/TLS/RTP/SAVP 111", Some(FP), Some("active"), "");
        assert_eq!(
            RemoteAnswer::parse(&text).unwrap_err(),
            AnswerRejection::NoMatchingMedia
        );
    }

    #[test]
    fn video_without_fmt_96_is_no_matching_media() {
        let text = answer_text("m=video 9 UDP/TLS/RTP/SAVP 100", Some(FP), Some("active"), "");
        assert_eq!(
            RemoteAnswer::parse(&text).unwrap_err(),
            AnswerRejection::NoMatchingMedia
        );
    }

    #[test]
    fn plain_rtp_transport_is_unsupported() {
        let text = answer_text("m=video 9 RTP/AVP 96", Some(FP), Some("active"), "");
        assert_eq!(
            RemoteAnswer::parse(&text).unwrap_err(),
            AnswerRejection::UnsupportedTransport
        );
    }

    #[test]
    fn missing_fingerprint_is_flagged() {
        let text = answer_text("m=video 9 UDP/TLS/RTP/SAVP 96", None, Some("active"), "");
        assert_eq!(
            RemoteAnswer::parse(&text).unwrap_err(),
            AnswerRejection::FingerprintMissing
        );
    }

    #[test]
    fn unsupported_digest_is_invalid() {
        let text = answer_text(
            "m=video 9 UDP/TLS/RTP/SAVP 96",
            Some("md5 AA:BB"),
            Some("active"),
            "",
        );
        assert_eq!(
            RemoteAnswer::parse(&text).unwrap_err(),
            AnswerRejection::FingerprintInvalid
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            RemoteAnswer::parse("this is not sdp").unwrap_err(),
            AnswerRejection::MalformedSdp
        );
    }

    #[test]
    fn missing_setup_defaults_to_active() {
        let text = answer_text("m=video 9 UDP/TLS/RTP/SAVP 96", Some(FP), None, "");
        let answer = RemoteAnswer::parse(&text).unwrap();
        assert_eq!(answer.setup, "active");
    }

    #[test]
    fn ice_lite_is_detected() {
        let text = answer_text(
            "m=video 9 UDP/TLS/RTP/SAVP 96",
            Some(FP),
            Some("passive"),
            "a=ice-lite\r\n",
        );
        assert!(RemoteAnswer::parse(&text).unwrap().ice_lite);
    }
}
