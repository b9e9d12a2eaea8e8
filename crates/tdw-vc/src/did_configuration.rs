//! # Well-Known DID Configuration
//!
//! Links a DID to a web origin with a `DomainLinkageCredential` issued by the
//! DID itself. The credential is an ordinary signed document here: it
//! verifies when its proof comes from a verification method the DID
//! document lists under `assertionMethod`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tdw_core::{DidDocument, Timestamp};
use tdw_crypto::{decode_multikey, Ed25519PublicKey, Signer};

use crate::credential::{VcError, VerifiableCredential, CREDENTIALS_V2_CONTEXT};

/// Context of the DID Configuration resource and its credential type.
pub const DID_CONFIGURATION_CONTEXT: &str =
    "https://identity.foundation/.well-known/did-configuration/v1";

/// The `did-configuration.json` resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidConfiguration {
    #[serde(rename = "@context")]
    pub context: String,
    pub linked_dids: Vec<VerifiableCredential>,
}

/// Issue a domain linkage credential for `did` and `origin`, signed by
/// `signer` under `assertionMethod`.
pub fn create_did_configuration(
    did: &str,
    origin: &str,
    signer: &dyn Signer,
    timestamp: Option<Timestamp>,
) -> Result<DidConfiguration, VcError> {
    let timestamp = timestamp.unwrap_or_else(Timestamp::now);
    let mut vc = VerifiableCredential::new(
        vec![json!(CREDENTIALS_V2_CONTEXT), json!(DID_CONFIGURATION_CONTEXT)],
        &["DomainLinkageCredential"],
        did,
        timestamp,
        json!({"id": did, "origin": origin}),
    );
    vc.sign(signer, timestamp)?;
    tracing::info!(did, origin, kid = %signer.kid(), "created DID configuration");
    Ok(DidConfiguration {
        context: DID_CONFIGURATION_CONTEXT.to_string(),
        linked_dids: vec![vc],
    })
}

/// Check every linked credential against `document`.
///
/// Each credential must be issued by and about the document's DID, and each
/// proof must come from an `assertionMethod` of the document and verify with
/// that method's key.
pub fn verify_did_configuration(
    configuration: &DidConfiguration,
    document: &DidDocument,
) -> Result<(), VcError> {
    if configuration.linked_dids.is_empty() {
        return Err(VcError::Malformed("no linked DIDs".into()));
    }
    for vc in &configuration.linked_dids {
        if vc.issuer != document.id {
            return Err(VcError::Malformed(format!(
                "credential issuer {} is not {}",
                vc.issuer, document.id
            )));
        }
        if vc.credential_subject.get("id").and_then(Value::as_str) != Some(document.id.as_str()) {
            return Err(VcError::Malformed(
                "credentialSubject.id does not name the DID".into(),
            ));
        }
        if vc.credential_subject.get("origin").and_then(Value::as_str).is_none() {
            return Err(VcError::Malformed("credentialSubject.origin is missing".into()));
        }
        vc.verify_all(|vm| assertion_key(document, vm))?;
    }
    Ok(())
}

fn assertion_key(document: &DidDocument, vm: &str) -> Result<Ed25519PublicKey, VcError> {
    if !document.has_assertion_method(vm) {
        return Err(VcError::UnauthorizedMethod(format!(
            "{vm} is not an assertionMethod of {}",
            document.id
        )));
    }
    let method = document
        .find_verification_method(vm)
        .ok_or_else(|| VcError::UnauthorizedMethod(format!("{vm} is not defined")))?;
    let multikey = method
        .public_key_multibase
        .as_deref()
        .ok_or_else(|| VcError::Malformed(format!("{vm} has no publicKeyMultibase")))?;
    Ok(decode_multikey(multikey)?)
}
