use std::{fmt, str::FromStr};

use super::attribute::Attribute;
use super::connection::Connection;
use super::sdp_error::SdpError;

/// Media types an `m=` section can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Application,
    Other(String),
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
            Self::Application => f.write_str("application"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MediaKind {
    fn from(s: &str) -> Self {
        match s {
            "audio" => Self::Audio,
            "video" => Self::Video,
            "application" => Self::Application,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// One `m=` section: media description plus its attributes.
#[derive(Debug, Clone)]
pub struct Media {
    pub kind: MediaKind,
    pub port: u16,
    pub proto: String,
    pub fmts: Vec<String>,
    pub connection: Option<Connection>,
    pub attrs: Vec<Attribute>,
}

impl Media {
    #[must_use]
    pub fn new<P: Into<String>>(kind: MediaKind, port: u16, proto: P, fmts: Vec<String>) -> Self {
        Self {
            kind,
            port,
            proto: proto.into(),
            fmts,
            connection: None,
            attrs: Vec::new(),
        }
    }

    pub fn push_attr(&mut self, attr: Attribute) {
        self.attrs.push(attr);
    }

    /// First value of attribute `key`, if present with a value.
    #[must_use]
    pub fn attr_value(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.key() == key)
            .and_then(Attribute::value)
    }

    /// True if attribute `key` appears at all (flag or valued).
    #[must_use]
    pub fn has_attr(&self, key: &str) -> bool {
        self.attrs.iter().any(|a| a.key() == key)
    }

    /// All values of repeated attribute `key` (e.g. `candidate`).
    #[must_use]
    pub fn attr_values<'a>(&'a self, key: &'a str) -> Vec<&'a str> {
        self.attrs
            .iter()
            .filter(|a| a.key() == key)
            .filter_map(Attribute::value)
            .collect()
    }

    /// Writes the section (m-line, c-line, attributes) as CRLF lines.
    pub fn encode_into(&self, out: &mut String) {
        out.push_str(&format!(
            "m={} {} {} {}\r\n",
            self.kind,
            self.port,
            self.proto,
            self.fmts.join(" ")
        ));
        if let Some(c) = &self.connection {
            out.push_str(&format!("c={c}\r\n"));
        }
        for a in &self.attrs {
            out.push_str(&format!("a={a}\r\n"));
        }
    }
}

impl FromStr for Media {
    type Err = SdpError;

    /// Parses the right-hand side of an `m=` line.
    /// Port ranges (`9/2`) collapse to the base port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(SdpError::Invalid("m="));
        }
        let port_token = parts[1].split('/').next().unwrap_or(parts[1]);
        let port: u16 = port_token.parse()?;
        Ok(Self::new(
            MediaKind::from(parts[0]),
            port,
            parts[2],
            parts[3..].iter().map(|s| (*s).to_owned()).collect(),
        ))
    }
}
