//! # Verifiable Credential Envelope
//!
//! A minimal W3C VC Data Model 2.0 credential secured with Data Integrity
//! proofs (`eddsa-jcs-2022`). The envelope members are typed;
//! `credentialSubject` stays free-form JSON.
//!
//! ## Security Invariants
//!
//! - The signed document is the credential with `proof` removed, serialized
//!   through `CanonicalBytes` by the proof engine.
//! - Verification resolves every proof's verification method through a
//!   caller-supplied function, so the caller decides which keys count.
//! - A credential with no proofs never verifies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use tdw_core::{OneOrMany, Timestamp};
use tdw_crypto::{sign_document, verify_proof, DataIntegrityProof, Ed25519PublicKey, ProofPurpose, Signer};

/// VC Data Model 2.0 base context.
pub const CREDENTIALS_V2_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";

/// Errors from credential signing and verification.
#[derive(Error, Debug)]
pub enum VcError {
    /// A proof did not verify.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// The verification method is not acceptable for this credential.
    #[error("verification method not authorized: {0}")]
    UnauthorizedMethod(String),

    /// The credential carries no proofs.
    #[error("credential has no proofs")]
    NoProofs,

    /// The credential is outside its validity period.
    #[error("credential not valid: {0}")]
    NotValid(String),

    /// The credential or configuration has the wrong shape.
    #[error("malformed credential: {0}")]
    Malformed(String),

    /// Signing or proof decoding failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] tdw_crypto::CryptoError),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of checking one proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofResult {
    pub verification_method: String,
    pub ok: bool,
    /// Empty when `ok`.
    pub error: String,
}

/// A Verifiable Credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: OneOrMany<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub credential_type: OneOrMany<String>,
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<Timestamp>,
    pub credential_subject: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<OneOrMany<DataIntegrityProof>>,
}

impl VerifiableCredential {
    /// An unsigned credential of the given types, valid from `valid_from`.
    ///
    /// `VerifiableCredential` is always the first type.
    pub fn new(
        contexts: Vec<Value>,
        types: &[&str],
        issuer: impl Into<String>,
        valid_from: Timestamp,
        credential_subject: Value,
    ) -> Self {
        let mut credential_type = vec!["VerifiableCredential".to_string()];
        credential_type.extend(
            types
                .iter()
                .filter(|t| **t != "VerifiableCredential")
                .map(|t| t.to_string()),
        );
        Self {
            context: OneOrMany::Many(contexts),
            id: None,
            credential_type: OneOrMany::Many(credential_type),
            issuer: issuer.into(),
            valid_from: Some(valid_from),
            valid_until: None,
            credential_subject,
            proof: None,
        }
    }

    /// Whether `VerifiableCredential` is among the types.
    pub fn has_vc_type(&self) -> bool {
        self.credential_type
            .iter()
            .any(|t| t == "VerifiableCredential")
    }

    /// Attached proofs, in order.
    pub fn proofs(&self) -> Vec<&DataIntegrityProof> {
        self.proof.iter().flat_map(OneOrMany::iter).collect()
    }

    /// The credential without `proof`, as covered by a signature.
    pub fn unsecured(&self) -> Result<Value, VcError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("proof");
        }
        Ok(value)
    }

    /// Append an `assertionMethod` proof from `signer`, naming its kid as
    /// the verification method.
    pub fn sign(&mut self, signer: &dyn Signer, created: Timestamp) -> Result<(), VcError> {
        let proof = sign_document(
            &self.unsecured()?,
            signer,
            signer.kid(),
            ProofPurpose::AssertionMethod,
            created,
        )?;
        tracing::debug!(issuer = %self.issuer, kid = %signer.kid(), "signed credential");
        self.proof = Some(match self.proof.take() {
            None => OneOrMany::Many(vec![proof]),
            Some(existing) => existing.push(proof),
        });
        Ok(())
    }

    /// Check each proof, resolving verification methods with `resolve_key`.
    pub fn verify<F>(&self, resolve_key: F) -> Vec<ProofResult>
    where
        F: Fn(&str) -> Result<Ed25519PublicKey, VcError>,
    {
        let unsecured = match self.unsecured() {
            Ok(v) => v,
            Err(e) => {
                return self
                    .proofs()
                    .iter()
                    .map(|p| ProofResult {
                        verification_method: p.verification_method.clone(),
                        ok: false,
                        error: e.to_string(),
                    })
                    .collect()
            }
        };
        self.proofs()
            .iter()
            .map(|proof| {
                let verification_method = proof.verification_method.clone();
                match verify_single_proof(&unsecured, proof, &resolve_key) {
                    Ok(()) => ProofResult {
                        verification_method,
                        ok: true,
                        error: String::new(),
                    },
                    Err(e) => ProofResult {
                        verification_method,
                        ok: false,
                        error: e.to_string(),
                    },
                }
            })
            .collect()
    }

    /// Succeed only if the credential is currently valid, has at least one
    /// proof, and every proof verifies.
    pub fn verify_all<F>(&self, resolve_key: F) -> Result<(), VcError>
    where
        F: Fn(&str) -> Result<Ed25519PublicKey, VcError>,
    {
        self.check_validity(Timestamp::now())?;
        let results = self.verify(resolve_key);
        if results.is_empty() {
            return Err(VcError::NoProofs);
        }
        match results.into_iter().find(|r| !r.ok) {
            Some(failed) => Err(VcError::VerificationFailed(format!(
                "proof from {} failed: {}",
                failed.verification_method, failed.error
            ))),
            None => Ok(()),
        }
    }

    /// Check the validity window against `now`.
    pub fn check_validity(&self, now: Timestamp) -> Result<(), VcError> {
        if let Some(from) = self.valid_from {
            if now < from {
                return Err(VcError::NotValid(format!("not valid before {from}")));
            }
        }
        if let Some(until) = self.valid_until {
            if now > until {
                return Err(VcError::NotValid(format!("expired at {until}")));
            }
        }
        Ok(())
    }
}

fn verify_single_proof<F>(
    unsecured: &Value,
    proof: &DataIntegrityProof,
    resolve_key: &F,
) -> Result<(), VcError>
where
    F: Fn(&str) -> Result<Ed25519PublicKey, VcError>,
{
    if proof.purpose() != Some(ProofPurpose::AssertionMethod) {
        return Err(VcError::UnauthorizedMethod(format!(
            "proof purpose {:?} is not assertionMethod",
            proof.proof_purpose
        )));
    }
    let key = resolve_key(&proof.verification_method)?;
    verify_proof(unsecured, proof, &key)
        .map_err(|e| VcError::VerificationFailed(e.to_string()))
}
