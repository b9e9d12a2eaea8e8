//! # Document State Chain
//!
//! A [`DocumentState`] is one immutable version of a DID. `initial` derives
//! the SCID and produces version 1; `next` consumes nothing and returns a new
//! state for version N+1. Neither call signs: proofs are attached afterwards
//! with [`DocumentState::sign`] or [`DocumentState::with_proof`], so a
//! version may carry several proofs.
//!
//! ## Version identity
//!
//! `versionId` is `"<n>-<versionHash>"`. The hash is taken over the JCS of
//!
//! ```json
//! {"versionId": <predecessor>, "versionTime": ..., "parameters": ..., "state": ...}
//! ```
//!
//! where `<predecessor>` is the previous `versionId`, or the SCID for
//! version 1. Each version id therefore commits to the whole chain before it.

use serde_json::{json, Value};

use tdw_core::{
    resolve_genesis, CanonicalBytes, DidDocument, HashAlgorithm, MethodConfig, Params,
    ParamsUpdate, TdwError, Timestamp, SCID_PLACEHOLDER,
};
use tdw_crypto::{
    did_key_verification_method, sign_document, DataIntegrityProof, ProofPurpose, Signer,
};

use crate::authorization::{authorize_signer, check_rotation};
use crate::log::HistoryEntry;

/// One version of a DID document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    version_number: u64,
    version_hash: String,
    predecessor: String,
    timestamp: Timestamp,
    document: DidDocument,
    params: Params,
    params_update: ParamsUpdate,
    authorizing_keys: Vec<String>,
    proofs: Vec<DataIntegrityProof>,
}

impl DocumentState {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create version 1 from a genesis document whose id contains the SCID
    /// placeholder.
    ///
    /// `method` is filled in when absent and `scid` is set to the placeholder
    /// before derivation. The SCID length is `params.scidLength`, else
    /// `scid_length`, else the configured default.
    ///
    /// # Errors
    ///
    /// `InvalidGenesisFormat` for a missing placeholder or malformed DID,
    /// `InvalidParams` for empty `updateKeys` or a conflicting `scid`,
    /// `UnsupportedAlgorithm` for an unknown hash.
    pub fn initial(
        document: DidDocument,
        mut params: ParamsUpdate,
        timestamp: Option<Timestamp>,
        scid_length: Option<usize>,
        config: &MethodConfig,
    ) -> Result<Self, TdwError> {
        if params.method.is_none() {
            params.method = Some(config.method_param());
        }
        match params.scid.as_deref() {
            None | Some(SCID_PLACEHOLDER) => params.scid = Some(SCID_PLACEHOLDER.to_string()),
            Some(other) => {
                return Err(TdwError::InvalidParams(format!(
                    "genesis 'scid' must be the placeholder, got {other:?}"
                )))
            }
        }
        if params.update_keys.as_ref().map_or(true, Vec::is_empty) {
            return Err(TdwError::InvalidParams(
                "genesis must set at least one update key".into(),
            ));
        }
        let hash = match params.hash.as_deref() {
            Some(name) => name.parse()?,
            None => config.default_hash,
        };
        let length = params
            .scid_length
            .or(scid_length)
            .unwrap_or(config.default_scid_length);

        let resolved = resolve_genesis(
            document.to_value()?,
            params.to_value()?,
            hash,
            length,
            config,
        )?;
        let document = DidDocument::from_value(resolved.document)?;
        let params_update = ParamsUpdate::from_value(resolved.parameters)?;
        let effective = Params::genesis(&params_update, config)?;
        let timestamp = timestamp.unwrap_or_else(Timestamp::now);

        let version_hash = compute_version_hash(
            &resolved.scid,
            &timestamp.to_iso8601(),
            &params_update.to_value()?,
            &document.to_value()?,
            effective.hash,
        )?;
        tracing::info!(did = %document.id, scid = %resolved.scid, "created genesis version");
        Ok(Self {
            version_number: 1,
            version_hash,
            predecessor: resolved.scid,
            timestamp,
            document,
            authorizing_keys: effective.update_keys.clone(),
            params: effective,
            params_update,
            proofs: Vec::new(),
        })
    }

    /// Produce the next version from a modified document and an optional
    /// parameter update.
    ///
    /// Without a timestamp the current time is used, raised to the prior
    /// version's time if the clock is behind.
    ///
    /// # Errors
    ///
    /// `IdentifierMismatch` if the document id changed, `InvalidParams` for an
    /// illegal parameter change or a deactivated predecessor,
    /// `UnauthorizedKeyRotation` for a key that breaks pre-rotation,
    /// `NonMonotonicTimestamp` for an explicit time before the prior version.
    pub fn next(
        &self,
        document: DidDocument,
        params: Option<ParamsUpdate>,
        timestamp: Option<Timestamp>,
    ) -> Result<Self, TdwError> {
        if self.params.deactivated {
            return Err(TdwError::InvalidParams(format!(
                "{} is deactivated and cannot be updated",
                self.document.id
            )));
        }
        if document.id != self.document.id {
            return Err(TdwError::IdentifierMismatch {
                expected: self.document.id.clone(),
                found: document.id,
            });
        }
        let params_update = params.unwrap_or_default();
        let effective = self.params.apply(&params_update)?;
        check_rotation(&self.params, &effective)?;

        let timestamp = match timestamp {
            Some(t) if t < self.timestamp => {
                return Err(TdwError::NonMonotonicTimestamp {
                    previous: self.timestamp,
                    given: t,
                })
            }
            Some(t) => t,
            None => Timestamp::now().max(self.timestamp),
        };

        let predecessor = self.version_id();
        let version_hash = compute_version_hash(
            &predecessor,
            &timestamp.to_iso8601(),
            &params_update.to_value()?,
            &document.to_value()?,
            effective.hash,
        )?;
        let version_number = self.version_number + 1;
        tracing::info!(did = %document.id, version_id = version_number, "created version");
        Ok(Self {
            version_number,
            version_hash,
            predecessor,
            timestamp,
            document,
            params: effective,
            params_update,
            authorizing_keys: self.params.update_keys.clone(),
            proofs: Vec::new(),
        })
    }

    /// Produce a terminal version: `deactivated` set, no update keys left.
    pub fn deactivate(&self, timestamp: Option<Timestamp>) -> Result<Self, TdwError> {
        let update = ParamsUpdate {
            deactivated: Some(true),
            update_keys: Some(Vec::new()),
            ..ParamsUpdate::default()
        };
        self.next(self.document_copy(), Some(update), timestamp)
    }

    /// Rebuild a state from verified history content.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        version_number: u64,
        version_hash: String,
        predecessor: String,
        timestamp: Timestamp,
        document: DidDocument,
        params: Params,
        params_update: ParamsUpdate,
        authorizing_keys: Vec<String>,
        proofs: Vec<DataIntegrityProof>,
    ) -> Self {
        Self {
            version_number,
            version_hash,
            predecessor,
            timestamp,
            document,
            params,
            params_update,
            authorizing_keys,
            proofs,
        }
    }

    // ------------------------------------------------------------------
    // Proofs
    // ------------------------------------------------------------------

    /// Check that `signer` may sign this version.
    pub fn authorize(&self, signer: &dyn Signer) -> Result<(), TdwError> {
        authorize_signer(&self.authorizing_keys, signer)
    }

    /// Return a copy of this state with a proof from `signer` appended.
    ///
    /// # Errors
    ///
    /// `UnauthorizedKeyRotation` if the signer's key is not authorized for
    /// this version, `ProofInvalid` if signing fails.
    pub fn sign(&self, signer: &dyn Signer) -> Result<Self, TdwError> {
        self.authorize(signer)?;
        let proof = sign_document(
            &self.signing_input()?,
            signer,
            &did_key_verification_method(signer.multikey()),
            ProofPurpose::Authentication,
            self.timestamp,
        )?;
        tracing::debug!(
            did = %self.document.id,
            version_id = self.version_number,
            kid = %signer.kid(),
            "signed version"
        );
        Ok(self.with_proof(proof))
    }

    /// Return a copy of this state with `proof` appended, unchecked.
    pub fn with_proof(&self, proof: DataIntegrityProof) -> Self {
        let mut next = self.clone();
        next.proofs.push(proof);
        next
    }

    /// The unsecured history entry a proof covers.
    pub fn signing_input(&self) -> Result<Value, TdwError> {
        Ok(json!({
            "versionId": self.version_id(),
            "versionTime": self.timestamp.to_iso8601(),
            "parameters": self.params_update.to_value()?,
            "state": self.document.to_value()?,
        }))
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// The persisted record of this version.
    pub fn history_entry(&self) -> Result<HistoryEntry, TdwError> {
        Ok(HistoryEntry {
            version_id: self.version_id(),
            version_time: self.timestamp.to_iso8601(),
            parameters: self.params_update.to_value()?,
            state: self.document.to_value()?,
            proof: self.proofs.clone(),
        })
    }

    /// An owned copy of the document for the caller to transform.
    pub fn document_copy(&self) -> DidDocument {
        self.document.clone()
    }

    /// `"<n>-<versionHash>"`.
    pub fn version_id(&self) -> String {
        format!("{}-{}", self.version_number, self.version_hash)
    }

    pub fn version_number(&self) -> u64 {
        self.version_number
    }

    pub fn version_hash(&self) -> &str {
        &self.version_hash
    }

    /// Previous `versionId`, or the SCID for version 1.
    pub fn predecessor(&self) -> &str {
        &self.predecessor
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn document(&self) -> &DidDocument {
        &self.document
    }

    pub fn document_id(&self) -> &str {
        &self.document.id
    }

    /// Effective parameters after this version.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The parameter delta recorded for this version.
    pub fn params_update(&self) -> &ParamsUpdate {
        &self.params_update
    }

    /// Keys allowed to sign this version.
    pub fn authorizing_keys(&self) -> &[String] {
        &self.authorizing_keys
    }

    pub fn proofs(&self) -> &[DataIntegrityProof] {
        &self.proofs
    }

    pub fn scid(&self) -> &str {
        &self.params.scid
    }

    pub fn is_deactivated(&self) -> bool {
        self.params.deactivated
    }
}

/// Hash of a version's content linked to its predecessor, in base32.
pub fn compute_version_hash(
    predecessor: &str,
    version_time: &str,
    parameters: &Value,
    state: &Value,
    hash: HashAlgorithm,
) -> Result<String, TdwError> {
    let input = CanonicalBytes::from_value(json!({
        "versionId": predecessor,
        "versionTime": version_time,
        "parameters": parameters,
        "state": state,
    }))?;
    Ok(hash.digest(&input).to_base32())
}
