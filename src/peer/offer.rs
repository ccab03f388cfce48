use rand::Rng;
use rand::rngs::OsRng;

use crate::ice::Candidate;
use crate::rtp::config::{H264_CLOCK_RATE, H264_PAYLOAD_TYPE};
use crate::sdp::attribute::Attribute;
use crate::sdp::connection::Connection;
use crate::sdp::media::{Media, MediaKind};
use crate::sdp::origin::Origin;
use crate::sdp::sdpc::Sdp;

/// Everything the offer builder needs from the peer.
pub struct OfferParams<'a> {
    pub ice_ufrag: &'a str,
    pub ice_pwd: &'a str,
    /// Local certificate fingerprint, colon-separated SHA-256 hex.
    pub fingerprint: &'a str,
    pub outbound_ssrc: u32,
    pub cname: &'a str,
    pub candidates: &'a [Candidate],
}

/// Builds the one-section sendonly H.264 offer.
///
/// Shape: BUNDLE group `v`, trickle ice2, DTLS-SRTP transport on port 9,
/// `setup:actpass` (the answer picks the DTLS roles), one `a=ssrc` line
/// with the peer's outbound SSRC, one `a=candidate` per gathered host
/// candidate, closed by `end-of-candidates`.
#[must_use]
pub fn build_offer(params: &OfferParams<'_>) -> Sdp {
    let session_id: u64 = OsRng.r#gen::<u64>() >> 1;
    let mut sdp = Sdp::session(Origin::anonymous(session_id, 2), "-");

    sdp.attrs.push(Attribute::new("group", Some("BUNDLE v".to_owned())));
    sdp.attrs.push(Attribute::new("ice-options", Some("ice2".to_owned())));
    sdp.attrs.push(Attribute::new(
        "fingerprint",
        Some(format!("sha-256 {}", params.fingerprint)),
    ));

    let mut media = Media::new(
        MediaKind::Video,
        9,
        "UDP/TLS/RTP/SAVP",
        vec![H264_PAYLOAD_TYPE.to_string()],
    );
    media.connection = Some(Connection::new("IN", "IP4", "0.0.0.0"));
    media.push_attr(Attribute::new("mid", Some("v".to_owned())));
    media.push_attr(Attribute::new("ice-ufrag", Some(params.ice_ufrag.to_owned())));
    media.push_attr(Attribute::new("ice-pwd", Some(params.ice_pwd.to_owned())));
    media.push_attr(Attribute::new("setup", Some("actpass".to_owned())));
    media.push_attr(Attribute::new(
        "rtpmap",
        Some(format!("{H264_PAYLOAD_TYPE} H264/{H264_CLOCK_RATE}")),
    ));
    media.push_attr(Attribute::flag("rtcp-mux"));
    media.push_attr(Attribute::flag("sendonly"));
    media.push_attr(Attribute::new(
        "ssrc",
        Some(format!("{} cname:{}", params.outbound_ssrc, params.cname)),
    ));
    for candidate in params.candidates {
        media.push_attr(Attribute::new(
            "candidate",
            Some(candidate.to_attribute_value()),
        ));
    }
    // Gathering is synchronous, so the offer is always complete.
    media.push_attr(Attribute::flag("end-of-candidates"));

    sdp.media.push(media);
    sdp
}
