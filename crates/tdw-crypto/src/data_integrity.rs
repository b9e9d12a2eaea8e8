//! # Data Integrity Proofs (`eddsa-jcs-2022`)
//!
//! A proof is attached to an unsecured JSON document. The signature covers
//! `sha256(JCS(proof options)) || sha256(JCS(document))`, where the proof
//! options are the proof object without `proofValue`. Changing any member of
//! either the document or the options invalidates the signature.
//!
//! Which keys are *allowed* to sign is not decided here; callers check the
//! verification method against their own authorization rules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tdw_core::{CanonicalBytes, Timestamp};

use crate::ed25519::{verify, Ed25519PublicKey, Ed25519Signature, SigningPayload};
use crate::error::CryptoError;
use crate::signer::Signer;

/// Proof `type` value.
pub const PROOF_TYPE: &str = "DataIntegrityProof";

/// Cryptosuite implemented here.
pub const CRYPTOSUITE: &str = "eddsa-jcs-2022";

/// Relationship under which a proof is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofPurpose {
    /// History entries.
    Authentication,
    /// Credentials.
    AssertionMethod,
}

impl ProofPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::AssertionMethod => "assertionMethod",
        }
    }
}

/// A Data Integrity proof object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataIntegrityProof {
    #[serde(rename = "type")]
    pub type_: String,
    pub cryptosuite: String,
    pub verification_method: String,
    /// Kept as written so canonical bytes match the signer's.
    pub created: String,
    pub proof_purpose: String,
    pub proof_value: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataIntegrityProof {
    /// The proof without `proofValue`, as covered by the signature.
    fn options(&self) -> Result<CanonicalBytes, CryptoError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("proofValue");
        }
        Ok(CanonicalBytes::from_value(value)?)
    }

    /// The proof purpose, if it is one of the known relationships.
    pub fn purpose(&self) -> Option<ProofPurpose> {
        match self.proof_purpose.as_str() {
            "authentication" => Some(ProofPurpose::Authentication),
            "assertionMethod" => Some(ProofPurpose::AssertionMethod),
            _ => None,
        }
    }
}

/// Sign `document` (which must not contain a `proof` member).
pub fn sign_document(
    document: &Value,
    signer: &dyn Signer,
    verification_method: &str,
    purpose: ProofPurpose,
    created: Timestamp,
) -> Result<DataIntegrityProof, CryptoError> {
    let mut proof = DataIntegrityProof {
        type_: PROOF_TYPE.to_string(),
        cryptosuite: CRYPTOSUITE.to_string(),
        verification_method: verification_method.to_string(),
        created: created.to_iso8601(),
        proof_purpose: purpose.as_str().to_string(),
        proof_value: String::new(),
        extra: Map::new(),
    };
    let payload = SigningPayload::data_integrity(
        &proof.options()?,
        &CanonicalBytes::new(document)?,
    );
    let signature = signer.sign(&payload)?;
    proof.proof_value = signature.to_multibase();
    tracing::debug!(
        kid = %signer.kid(),
        verification_method,
        purpose = purpose.as_str(),
        "created data integrity proof"
    );
    Ok(proof)
}

/// Verify `proof` over `document` with `public_key`.
///
/// # Errors
///
/// `UnsupportedAlgorithm` for an unknown proof type or cryptosuite,
/// `Encoding` for a malformed `proofValue`, `VerificationFailed` when the
/// signature does not match.
pub fn verify_proof(
    document: &Value,
    proof: &DataIntegrityProof,
    public_key: &Ed25519PublicKey,
) -> Result<(), CryptoError> {
    if proof.type_ != PROOF_TYPE {
        return Err(CryptoError::UnsupportedAlgorithm(format!(
            "proof type {:?}",
            proof.type_
        )));
    }
    if proof.cryptosuite != CRYPTOSUITE {
        return Err(CryptoError::UnsupportedAlgorithm(format!(
            "cryptosuite {:?}",
            proof.cryptosuite
        )));
    }
    let signature = Ed25519Signature::from_multibase(&proof.proof_value)?;
    let payload = SigningPayload::data_integrity(
        &proof.options()?,
        &CanonicalBytes::new(document)?,
    );
    verify(&payload, &signature, public_key)
}
