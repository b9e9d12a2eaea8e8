//! # Multikey Encoding
//!
//! A multikey is `z` + base58btc(multicodec prefix ‖ raw public key). For
//! Ed25519 the prefix is `0xed 0x01`, which is why every such key starts with
//! `z6Mk`.
//!
//! Also here: the deterministic verification-method fragment derived from a
//! multikey, the `did:key` verification method used on history proofs, and
//! the pre-rotation commitment hash.

use serde_json::json;
use sha2::{Digest as _, Sha256};

use tdw_core::{CanonicalBytes, HashAlgorithm};

use crate::ed25519::Ed25519PublicKey;
use crate::error::CryptoError;

/// Multicodec prefix of an Ed25519 public key.
const ED25519_PUB_PREFIX: [u8; 2] = [0xed, 0x01];

/// Encode an Ed25519 public key as a multikey.
pub fn encode_multikey(pk: &Ed25519PublicKey) -> String {
    let mut bytes = Vec::with_capacity(34);
    bytes.extend_from_slice(&ED25519_PUB_PREFIX);
    bytes.extend_from_slice(pk.as_bytes());
    multibase::encode(multibase::Base::Base58Btc, bytes)
}

/// Decode a multikey into an Ed25519 public key.
///
/// # Errors
///
/// `Encoding` for malformed strings, `UnsupportedAlgorithm` for a key type
/// other than Ed25519.
pub fn decode_multikey(mk: &str) -> Result<Ed25519PublicKey, CryptoError> {
    let (base, bytes) =
        multibase::decode(mk).map_err(|e| CryptoError::Encoding(format!("multikey {mk:?}: {e}")))?;
    if base != multibase::Base::Base58Btc {
        return Err(CryptoError::Encoding(format!(
            "multikey must be base58btc, got {base:?}"
        )));
    }
    if bytes.len() < 2 || bytes[..2] != ED25519_PUB_PREFIX {
        return Err(CryptoError::UnsupportedAlgorithm(format!(
            "multikey {mk:?} is not an Ed25519 key"
        )));
    }
    let raw: [u8; 32] = bytes[2..].try_into().map_err(|_| {
        CryptoError::KeyError(format!(
            "Ed25519 multikey must hold 32 key bytes, got {}",
            bytes.len() - 2
        ))
    })?;
    Ok(Ed25519PublicKey::from_bytes(raw))
}

/// Deterministic verification-method fragment for a multikey, including the
/// leading `#`.
///
/// base64url (no padding) of the SHA-256 of the canonical
/// `{"type":"Multikey","publicKeyMultibase":<mk>}`.
pub fn multikey_fragment(mk: &str) -> Result<String, CryptoError> {
    let keydef = CanonicalBytes::new(&json!({
        "type": "Multikey",
        "publicKeyMultibase": mk,
    }))?;
    let digest = Sha256::digest(keydef.as_bytes());
    Ok(format!("#{}", multibase::Base::Base64Url.encode(digest)))
}

/// The `did:key` verification method naming `mk`, as put on history proofs.
pub fn did_key_verification_method(mk: &str) -> String {
    format!("did:key:{mk}#{mk}")
}

/// Extract the multikey from a `did:key:<mk>#<mk>` verification method.
///
/// Returns `None` unless both halves are present and identical.
pub fn multikey_from_verification_method(vm: &str) -> Option<&str> {
    let rest = vm.strip_prefix("did:key:")?;
    let (key, fragment) = rest.split_once('#')?;
    (key == fragment && !key.is_empty()).then_some(key)
}

/// Pre-rotation commitment to a future update key: the base32 digest of the
/// multikey's UTF-8 bytes.
pub fn next_key_hash(mk: &str, hash: HashAlgorithm) -> String {
    hash.digest_raw(mk.as_bytes()).to_base32()
}
