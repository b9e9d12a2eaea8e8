//! # Identifier Deriver — Self-Certifying Identifiers
//!
//! The SCID is the truncated base32 hash of the genesis document and genesis
//! parameters, canonicalized while the `{SCID}` placeholder still stands
//! wherever the identifier will appear. Once derived, the placeholder is
//! replaced in every string value and object key.
//!
//! Verification runs the same steps backwards: put the placeholder back in
//! place of the SCID, derive again, compare. Anyone holding version 1 of a
//! history can check the identifier without a registry.

use serde_json::{json, Map, Value};

use crate::canonical::CanonicalBytes;
use crate::config::MethodConfig;
use crate::did::{check_document_id_format, TdwDid};
use crate::digest::HashAlgorithm;
use crate::error::TdwError;
use crate::params::check_scid_length;

/// Token standing in for the SCID before it is known.
pub const SCID_PLACEHOLDER: &str = "{SCID}";

/// Genesis content after SCID substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGenesis {
    /// The derived identifier.
    pub scid: String,
    /// The parsed DID of the resolved document.
    pub did: TdwDid,
    /// The genesis document with the placeholder replaced.
    pub document: Value,
    /// The genesis parameters with the placeholder replaced.
    pub parameters: Value,
}

/// Compute the SCID of a genesis (document, parameters) pair in which the
/// placeholder is still present.
///
/// # Errors
///
/// `InvalidGenesisFormat` if the document id lacks the placeholder,
/// `InvalidParams` if `length` is out of range for `hash`.
pub fn derive_scid(
    document: &Value,
    parameters: &Value,
    hash: HashAlgorithm,
    length: usize,
) -> Result<String, TdwError> {
    let id_has_placeholder = document
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| id.contains(SCID_PLACEHOLDER));
    if !id_has_placeholder {
        return Err(TdwError::InvalidGenesisFormat(
            "missing SCID placeholder in document id".into(),
        ));
    }
    check_scid_length(length, hash)?;
    let input = CanonicalBytes::from_value(json!({
        "state": document,
        "parameters": parameters,
    }))?;
    hash.digest(&input).to_base32_truncated(length)
}

/// Derive the SCID and substitute it into the document and parameters.
///
/// # Errors
///
/// As for [`derive_scid`], plus `InvalidGenesisFormat` when the resolved
/// document id is not a valid DID ending in the SCID.
pub fn resolve_genesis(
    document: Value,
    parameters: Value,
    hash: HashAlgorithm,
    length: usize,
    config: &MethodConfig,
) -> Result<ResolvedGenesis, TdwError> {
    let scid = derive_scid(&document, &parameters, hash, length)?;
    let document = replace_in_value(document, SCID_PLACEHOLDER, &scid);
    let parameters = replace_in_value(parameters, SCID_PLACEHOLDER, &scid);
    let id = document.get("id").and_then(Value::as_str).unwrap_or_default();
    let did = check_document_id_format(id, &scid, config).map_err(|e| match e {
        TdwError::IdentifierMismatch { found, .. } => TdwError::InvalidGenesisFormat(format!(
            "placeholder must be the last DID segment, found {found:?}"
        )),
        other => other,
    })?;
    Ok(ResolvedGenesis {
        scid,
        did,
        document,
        parameters,
    })
}

/// Check that `scid` is the identifier derived from resolved genesis content.
///
/// The SCID length is taken from the identifier itself.
///
/// # Errors
///
/// `IdentifierMismatch` when re-derivation gives a different value or the
/// document id does not end in `scid`.
pub fn verify_scid(
    scid: &str,
    document: &Value,
    parameters: &Value,
    hash: HashAlgorithm,
    config: &MethodConfig,
) -> Result<TdwDid, TdwError> {
    let id = document
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| TdwError::InvalidGenesisFormat("document has no id".into()))?;
    let did = check_document_id_format(id, scid, config)?;
    let template_doc = replace_in_value(document.clone(), scid, SCID_PLACEHOLDER);
    let template_params = replace_in_value(parameters.clone(), scid, SCID_PLACEHOLDER);
    let derived = derive_scid(&template_doc, &template_params, hash, scid.len())?;
    if derived != scid {
        return Err(TdwError::IdentifierMismatch {
            expected: derived,
            found: scid.to_string(),
        });
    }
    Ok(did)
}

/// Replace every occurrence of `from` with `to` in string values and object
/// keys, recursively.
pub fn replace_in_value(value: Value, from: &str, to: &str) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace(from, to)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| replace_in_value(v, from, to))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.replace(from, to), replace_in_value(v, from, to));
            }
            Value::Object(out)
        }
        other => other,
    }
}
