//! Top-level SDP record and parse/encode entrypoints.
//!
//! Parsing is line-oriented: dispatch on the prefix (`v/o/s/c/t/m/a`) and
//! delegate each right-hand side to component types implementing
//! `FromStr<Err = SdpError>`. Input accepts `\n` or `\r\n`; output always
//! uses `\r\n` (CRLF). Lines this system has no use for (`b=`, `i=`,
//! `u=`, ...) are skipped on parse and never emitted.

use std::str::FromStr;

use super::attribute::Attribute;
use super::connection::Connection;
use super::media::Media;
use super::origin::Origin;
use super::sdp_error::SdpError;
use super::time_desc::TimeDesc;

/// In-memory representation of an SDP message (session + media sections).
///
/// `a=` and `c=` lines are applied to the **current media** section when
/// one is open, otherwise at the **session** level.
#[derive(Debug, Clone)]
pub struct Sdp {
    /// `v=` — always 0.
    pub version: u8,
    /// `o=` — session origin.
    pub origin: Origin,
    /// `s=` — session name.
    pub session_name: String,
    /// `c=` (session level).
    pub connection: Option<Connection>,
    /// `t=` lines.
    pub times: Vec<TimeDesc>,
    /// `a=` (session level).
    pub attrs: Vec<Attribute>,
    /// `m=` sections.
    pub media: Vec<Media>,
}

impl Sdp {
    /// A session skeleton with the fields every offer/answer here shares.
    #[must_use]
    pub fn session(origin: Origin, session_name: impl Into<String>) -> Self {
        Self {
            version: 0,
            origin,
            session_name: session_name.into(),
            connection: None,
            times: vec![TimeDesc::default()],
            attrs: Vec::new(),
            media: Vec::new(),
        }
    }

    /// Parse a full SDP text.
    ///
    /// Accepts LF or CRLF line endings; unknown prefixes are ignored.
    ///
    /// # Errors
    /// [`SdpError::Missing`] if `v=`, `o=` or `s=` is absent, or any
    /// component parse error.
    pub fn parse(input: &str) -> Result<Self, SdpError> {
        let mut version: Option<u8> = None;
        let mut origin: Option<Origin> = None;
        let mut session_name: Option<String> = None;
        let mut connection: Option<Connection> = None;
        let mut times: Vec<TimeDesc> = Vec::new();
        let mut attrs: Vec<Attribute> = Vec::new();
        let mut media: Vec<Media> = Vec::new();

        for raw in input.split('\n') {
            let line = raw.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let Some((prefix, rest)) = split_line(line) else {
                continue;
            };

            match prefix {
                "v" => version = Some(rest.parse::<u8>()?),
                "o" => origin = Some(rest.parse()?),
                "s" => session_name = Some(rest.to_owned()),
                "t" => times.push(rest.parse()?),
                "m" => media.push(rest.parse()?),
                "c" => {
                    let c: Connection = rest.parse()?;
                    match media.last_mut() {
                        Some(m) => m.connection = Some(c),
                        None => connection = Some(c),
                    }
                }
                "a" => {
                    let a: Attribute = Attribute::from_str(rest)?;
                    match media.last_mut() {
                        Some(m) => m.push_attr(a),
                        None => attrs.push(a),
                    }
                }
                _ => {} // b=, i=, u=, e=, p=, z=, r=, k= — nothing we consume
            }
        }

        Ok(Self {
            version: version.ok_or(SdpError::Missing("v="))?,
            origin: origin.ok_or(SdpError::Missing("o="))?,
            session_name: session_name.ok_or(SdpError::Missing("s="))?,
            connection,
            times,
            attrs,
            media,
        })
    }

    /// Serialise to text with CRLF line endings, attributes in insertion
    /// order.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(512);
        out.push_str(&format!("v={}\r\n", self.version));
        out.push_str(&format!("o={}\r\n", self.origin));
        out.push_str(&format!("s={}\r\n", self.session_name));
        if let Some(c) = &self.connection {
            out.push_str(&format!("c={c}\r\n"));
        }
        for t in &self.times {
            out.push_str(&format!("t={t}\r\n"));
        }
        for a in &self.attrs {
            out.push_str(&format!("a={a}\r\n"));
        }
        for m in &self.media {
            m.encode_into(&mut out);
        }
        out
    }

    /// First value of session-level attribute `key`.
    #[must_use]
    pub fn attr_value(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.key() == key)
            .and_then(Attribute::value)
    }

    /// True if `key` appears at session level.
    #[must_use]
    pub fn has_attr(&self, key: &str) -> bool {
        self.attrs.iter().any(|a| a.key() == key)
    }

    /// Attribute lookup that falls back from the media section to the
    /// session level, the way ice-ufrag/ice-pwd/fingerprint may appear at
    /// either.
    #[must_use]
    pub fn media_or_session_attr<'a>(&'a self, media: &'a Media, key: &str) -> Option<&'a str> {
        media.attr_value(key).or_else(|| self.attr_value(key))
    }
}

fn split_line(line: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = line.split_once('=')?;
    if prefix.len() != 1 {
        return None;
    }
    Some((prefix, rest))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    const ANSWER: &str = "v=0\r\n\
o=- 123 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE v\r\n\
m=video 9 UDP/TLS/RTP/SAVP 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=rtpmap:96 H264/90000\r\n\
a=rtcp-mux\r\n\
a=recvonly\r\n\
a=setup:active\r\n\
a=mid:v\r\n\
a=ice-ufrag:abcd1234\r\n\
a=ice-pwd:0123456789abcdef01234567\r\n\
a=fingerprint:sha-256 AA:BB\r\n";

    #[test]
    fn parse_routes_attrs_to_media() {
        let sdp = Sdp::parse(ANSWER).unwrap();
        assert_eq!(sdp.version, 0);
        assert_eq!(sdp.media.len(), 1);
        assert_eq!(sdp.attr_value("group"), Some("BUNDLE v"));
        let m = &sdp.media[0];
        assert_eq!(m.attr_value("setup"), Some("active"));
        assert!(m.has_attr("rtcp-mux"));
        assert_eq!(
            sdp.media_or_session_attr(m, "ice-ufrag"),
            Some("abcd1234")
        );
    }

    #[test]
    fn parse_accepts_bare_lf() {
        let lf = ANSWER.replace("\r\n", "\n");
        let sdp = Sdp::parse(&lf).unwrap();
        assert_eq!(sdp.media.len(), 1);
        assert_eq!(sdp.media[0].attr_value("setup"), Some("active"));
    }

    #[test]
    fn encode_is_crlf_and_reparses() {
        let sdp = Sdp::parse(ANSWER).unwrap();
        let text = sdp.encode();
        assert!(text.ends_with("\r\n"));
        assert!(!text.contains("\n\n"));
        let again = Sdp::parse(&text).unwrap();
        assert_eq!(again.media[0].attr_value("ice-pwd"), Some("0123456789abcdef01234567"));
    }

    #[test]
    fn missing_mandatory_lines() {
        assert!(matches!(
            Sdp::parse("o=- 1 1 IN IP4 0.0.0.0\ns=x\n"),
            Err(SdpError::Missing("v="))
        ));
        assert!(matches!(
            Sdp::parse("v=0\ns=x\n"),
            Err(SdpError::Missing("o="))
        ));
        assert!(matches!(
            Sdp::parse("v=0\no=- 1 1 IN IP4 0.0.0.0\n"),
            Err(SdpError::Missing("s="))
        ));
    }

    #[test]
    fn session_attr_fallback_prefers_media() {
        let text = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\na=ice-ufrag:sess\r\n\
m=video 9 UDP/TLS/RTP/SAVP 96\r\na=ice-ufrag:media\r\n";
        let sdp = Sdp::parse(text).unwrap();
        assert_eq!(
            sdp.media_or_session_attr(&sdp.media[0], "ice-ufrag"),
            Some("media")
        );
    }
}
