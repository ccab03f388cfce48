use std::{fmt, str::FromStr};

use super::sdp_error::SdpError;

/// An `a=` attribute: a key with an optional value.
/// Flag attributes (`rtcp-mux`, `sendonly`, ...) have no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    key: String,
    value: Option<String>,
}

impl Attribute {
    pub fn new<K: Into<String>, V: Into<Option<String>>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A value-less flag attribute.
    pub fn flag<K: Into<String>>(key: K) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl FromStr for Attribute {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SdpError::Invalid("a="));
        }
        match s.split_once(':') {
            Some((key, value)) => Ok(Self::new(key, Some(value.to_owned()))),
            None => Ok(Self::flag(s)),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}:{}", self.key, v),
            None => write!(f, "{}", self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn keyed_and_flag_attributes() {
        let a: Attribute = "rtpmap:96 H264/90000".parse().unwrap();
        assert_eq!(a.key(), "rtpmap");
        assert_eq!(a.value(), Some("96 H264/90000"));
        assert_eq!(a.to_string(), "rtpmap:96 H264/90000");

        let f: Attribute = "rtcp-mux".parse().unwrap();
        assert_eq!(f.key(), "rtcp-mux");
        assert_eq!(f.value(), None);
        assert_eq!(f.to_string(), "rtcp-mux");
    }
}
