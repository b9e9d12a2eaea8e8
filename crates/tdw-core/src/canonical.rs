//! # Canonical Serialization — RFC 8785 (JCS) Bytes
//!
//! `CanonicalBytes` is the only input accepted by the hashing and signing
//! paths. Two values that are equal as JSON produce identical bytes no matter
//! how their object keys were inserted, which is what makes version hashes
//! and SCIDs reproducible by any verifier.
//!
//! ## Security Invariant
//!
//! The inner buffer is private. The only constructors go through `serde_jcs`,
//! so a digest or signature can never be computed over non-canonical bytes.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// # Invariants
///
/// - Object keys are sorted, separators are compact.
/// - Numbers use the ECMAScript rendering of RFC 8785, so `0.5`, `1e21` and
///   `1.0` have a single textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `SerializationFailed` if the value cannot be represented as JSON.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(value)
    }

    /// Canonicalize an already-built JSON value.
    pub fn from_value(value: Value) -> Result<Self, CanonicalizationError> {
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_keys_with_compact_separators() {
        let data = serde_json::json!({"b": 2, "a": 1, "c": "hello"});
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        assert_eq!(cb.as_bytes(), br#"{"a":1,"b":2,"c":"hello"}"#);
    }

    #[test]
    fn nested_objects_are_sorted() {
        let data = serde_json::json!({
            "state": {"id": "did:tdw:x", "@context": ["a"]},
            "parameters": {"updateKeys": ["z6Mk"], "method": "did:tdw:1"}
        });
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(
            s,
            r#"{"parameters":{"method":"did:tdw:1","updateKeys":["z6Mk"]},"state":{"@context":["a"],"id":"did:tdw:x"}}"#
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = serde_json::Map::new();
        a.insert("versionId".into(), Value::from("1-abc"));
        a.insert("state".into(), serde_json::json!({"id": "x"}));
        let mut b = serde_json::Map::new();
        b.insert("state".into(), serde_json::json!({"id": "x"}));
        b.insert("versionId".into(), Value::from("1-abc"));
        let ca = CanonicalBytes::from_value(Value::Object(a)).unwrap();
        let cb = CanonicalBytes::from_value(Value::Object(b)).unwrap();
        assert_eq!(ca, cb);
    }

    #[test]
    fn floats_use_shortest_form() {
        let data = serde_json::json!({"weight": 0.5, "b": 1.0, "c": [3.25]});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"b":1,"c":[3.25],"weight":0.5}"#);
    }

    #[test]
    fn float_and_equal_integer_canonicalize_alike() {
        let a = CanonicalBytes::new(&serde_json::json!({"n": 2.0})).unwrap();
        let b = CanonicalBytes::new(&serde_json::json!({"n": 2})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn integers_and_literals_pass_through() {
        let data = serde_json::json!({"ttl": 3600, "deactivated": false, "x": null});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"deactivated":false,"ttl":3600,"x":null}"#);
    }

    #[test]
    fn empty_containers() {
        assert_eq!(CanonicalBytes::new(&serde_json::json!({})).unwrap().as_bytes(), b"{}");
        assert_eq!(CanonicalBytes::new(&serde_json::json!([])).unwrap().as_bytes(), b"[]");
    }

    #[test]
    fn unicode_is_not_escaped() {
        let data = serde_json::json!({"name": "\u{00e9}t\u{00e9}"});
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert!(s.contains('\u{00e9}'));
        assert!(!cb.is_empty());
    }
}
