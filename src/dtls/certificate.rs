use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509, X509NameBuilder};

use super::dtls_error::DtlsError;

/// Self-signed certificate plus key generated once at process start and
/// shared by every peer. Its SHA-256 fingerprint goes into each offer.
#[derive(Clone)]
pub struct DtlsIdentity {
    cert: X509,
    pkey: PKey<Private>,
    fingerprint: String,
}

impl DtlsIdentity {
    /// Generates an ECDSA P-256 identity.
    ///
    /// # Errors
    /// [`DtlsError::Ssl`] if openssl refuses any of the building steps.
    pub fn generate() -> Result<Self, DtlsError> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let ec_key = EcKey::generate(&group)?;
        let pkey = PKey::from_ec_key(ec_key)?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_text("CN", "restreamer")?;
        let name = name.build();

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        let mut serial = BigNum::new()?;
        serial.rand(64, MsbOption::MAYBE_ZERO, false)?;
        builder.set_serial_number(serial.to_asn1_integer()?.as_ref())?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&pkey)?;
        builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
        builder.set_not_after(Asn1Time::days_from_now(365)?.as_ref())?;
        builder.append_extension(BasicConstraints::new().build()?)?;
        builder.append_extension(
            SubjectAlternativeName::new()
                .dns("restreamer")
                .build(&builder.x509v3_context(None, None))?,
        )?;
        builder.sign(&pkey, MessageDigest::sha256())?;
        let cert = builder.build();

        let fingerprint = fingerprint_of(&cert)?;
        Ok(Self {
            cert,
            pkey,
            fingerprint,
        })
    }

    #[must_use]
    pub fn certificate(&self) -> &X509 {
        &self.cert
    }

    #[must_use]
    pub fn private_key(&self) -> &PKey<Private> {
        &self.pkey
    }

    /// Upper-case colon-separated SHA-256 digest, as SDP wants it.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Colon-separated SHA-256 digest of a certificate.
pub(crate) fn fingerprint_of(cert: &X509) -> Result<String, DtlsError> {
    let digest = cert.digest(MessageDigest::sha256())?;
    Ok(to_colon_hex(&digest))
}

fn to_colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// The fingerprint a remote SDP pinned, e.g.
/// `sha-256 AB:CD:...`. Comparison is case-insensitive on both the
/// algorithm token and the hex bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFingerprint {
    pub algorithm: String,
    pub value: String,
}

impl RemoteFingerprint {
    /// Parses the value of an `a=fingerprint` attribute.
    #[must_use]
    pub fn parse(attr_value: &str) -> Option<Self> {
        let (algorithm, value) = attr_value.trim().split_once(' ')?;
        if value.is_empty() {
            return None;
        }
        Some(Self {
            algorithm: algorithm.to_owned(),
            value: value.trim().to_owned(),
        })
    }

    /// Digest for the pinned algorithm; only the SHA family WebRTC uses.
    #[must_use]
    pub fn digest(&self) -> Option<MessageDigest> {
        match self.algorithm.to_ascii_lowercase().as_str() {
            "sha-256" => Some(MessageDigest::sha256()),
            "sha-1" => Some(MessageDigest::sha1()),
            _ => None,
        }
    }

    /// True if `cert` hashes to this fingerprint.
    #[must_use]
    pub fn matches(&self, cert: &X509) -> bool {
        let Some(digest) = self.digest() else {
            return false;
        };
        let Ok(hash) = cert.digest(digest) else {
            return false;
        };
        to_colon_hex(&hash).eq_ignore_ascii_case(&self.value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn generated_identity_has_sha256_fingerprint() {
        let id = DtlsIdentity::generate().unwrap();
        // 32 bytes -> 32 hex pairs joined by ':'.
        assert_eq!(id.fingerprint().len(), 32 * 3 - 1);
        assert!(id.fingerprint().chars().all(|c| c.is_ascii_hexdigit() || c == ':'));
    }

    #[test]
    fn remote_fingerprint_matches_own_cert() {
        let id = DtlsIdentity::generate().unwrap();
        let fp = RemoteFingerprint::parse(&format!("sha-256 {}", id.fingerprint())).unwrap();
        assert!(fp.matches(id.certificate()));

        // Case-insensitive on algorithm and hex.
        let lower = RemoteFingerprint::parse(&format!(
            "SHA-256 {}",
            id.fingerprint().to_ascii_lowercase()
        ))
        .unwrap();
        assert!(lower.matches(id.certificate()));
    }

    #[test]
    fn remote_fingerprint_rejects_other_cert() {
        let a = DtlsIdentity::generate().unwrap();
        let b = DtlsIdentity::generate().unwrap();
        let fp = RemoteFingerprint::parse(&format!("sha-256 {}", a.fingerprint())).unwrap();
        assert!(!fp.matches(b.certificate()));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(RemoteFingerprint::parse("sha-256").is_none());
        assert!(RemoteFingerprint::parse("").is_none());
    }

    #[test]
    fn unknown_algorithm_never_matches() {
        let id = DtlsIdentity::generate().unwrap();
        let fp = RemoteFingerprint {
            algorithm: "md5".to_owned(),
            value: id.fingerprint().to_owned(),
        };
        assert!(!fp.matches(id.certificate()));
    }
}
