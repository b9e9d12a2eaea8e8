//! # Content Hashing — Canonical Hasher
//!
//! Defines [`HashAlgorithm`] (selected by name through the `hash` method
//! parameter) and [`Digest`], the algorithm-tagged output used for SCIDs,
//! version hashes, and pre-rotation key commitments.
//!
//! ## Encoding
//!
//! Digests render as lowercase RFC 4648 base32 without padding. The
//! alphabet (`a-z`, `2-7`) has no `0`/`O` or `1`/`l` look-alikes, so a digest
//! copied by hand or embedded in a URL path survives intact.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::canonical::CanonicalBytes;
use crate::error::TdwError;

/// Hash algorithms accepted in the `hash` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256, the default.
    #[default]
    #[serde(rename = "sha-256")]
    Sha256,
    /// SHA-384.
    #[serde(rename = "sha-384")]
    Sha384,
    /// SHA-512.
    #[serde(rename = "sha-512")]
    Sha512,
}

impl HashAlgorithm {
    /// Returns the parameter name of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
            Self::Sha384 => "sha-384",
            Self::Sha512 => "sha-512",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Length of the base32 rendering of a full digest.
    pub fn encoded_len(&self) -> usize {
        (self.output_len() * 8).div_ceil(5)
    }

    /// Hash canonical bytes.
    pub fn digest(&self, data: &CanonicalBytes) -> Digest {
        self.digest_raw(data.as_bytes())
    }

    /// Hash a raw byte string.
    ///
    /// Only for inputs that are already a fixed textual encoding, such as a
    /// multikey string hashed into a pre-rotation commitment. Structured data
    /// must go through [`HashAlgorithm::digest`].
    pub fn digest_raw(&self, data: &[u8]) -> Digest {
        let bytes = match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        };
        Digest {
            algorithm: *self,
            bytes,
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = TdwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha-256" | "sha256" => Ok(Self::Sha256),
            "sha-384" | "sha384" => Ok(Self::Sha384),
            "sha-512" | "sha512" => Ok(Self::Sha512),
            other => Err(TdwError::UnsupportedAlgorithm(format!(
                "hash algorithm {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    /// The hash algorithm that produced this digest.
    pub algorithm: HashAlgorithm,
    /// The raw digest bytes.
    pub bytes: Vec<u8>,
}

impl Digest {
    /// Lowercase base32 (RFC 4648, no padding) rendering.
    pub fn to_base32(&self) -> String {
        multibase::Base::Base32Lower.encode(&self.bytes)
    }

    /// The first `len` characters of [`Digest::to_base32`].
    ///
    /// # Errors
    ///
    /// `InvalidParams` if `len` exceeds the encoded length.
    pub fn to_base32_truncated(&self, len: usize) -> Result<String, TdwError> {
        let full = self.to_base32();
        if len > full.len() {
            return Err(TdwError::InvalidParams(format!(
                "length {len} exceeds {} digest length {}",
                self.algorithm,
                full.len()
            )));
        }
        Ok(full[..len].to_string())
    }

    /// Lowercase hex rendering, for diagnostics.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_base32())
    }
}

/// Hash canonical bytes with SHA-256.
pub fn sha256_digest(data: &CanonicalBytes) -> Digest {
    HashAlgorithm::Sha256.digest(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sha256_vector() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        let digest = sha256_digest(&cb);
        assert_eq!(
            digest.to_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn base32_uses_unambiguous_alphabet() {
        let cb = CanonicalBytes::new(&serde_json::json!({"a": 1})).unwrap();
        let encoded = sha256_digest(&cb).to_base32();
        assert_eq!(encoded.len(), HashAlgorithm::Sha256.encoded_len());
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn encoded_lengths() {
        assert_eq!(HashAlgorithm::Sha256.encoded_len(), 52);
        assert_eq!(HashAlgorithm::Sha384.encoded_len(), 77);
        assert_eq!(HashAlgorithm::Sha512.encoded_len(), 103);
    }

    #[test]
    fn truncation() {
        let d = HashAlgorithm::Sha256.digest_raw(b"scid");
        let short = d.to_base32_truncated(28).unwrap();
        assert_eq!(short.len(), 28);
        assert!(d.to_base32().starts_with(&short));
        assert!(d.to_base32_truncated(53).is_err());
    }

    #[test]
    fn parse_names() {
        assert_eq!("sha-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha-512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!(matches!(
            "md5".parse::<HashAlgorithm>(),
            Err(TdwError::UnsupportedAlgorithm(_))
        ));
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha256);
    }

    #[test]
    fn algorithms_differ() {
        let a = HashAlgorithm::Sha256.digest_raw(b"x");
        let b = HashAlgorithm::Sha384.digest_raw(b"x");
        assert_ne!(a.bytes.len(), b.bytes.len());
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_tagged() {
        let d = HashAlgorithm::Sha256.digest_raw(b"x");
        assert!(d.to_string().starts_with("sha-256:"));
    }

    #[test]
    fn serde_uses_parameter_names() {
        let json = serde_json::to_string(&HashAlgorithm::Sha384).unwrap();
        assert_eq!(json, r#""sha-384""#);
    }
}
