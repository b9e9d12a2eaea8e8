//! # History Verifier
//!
//! Replays a persisted log entry by entry and rebuilds the trusted
//! [`DocumentState`]. Nothing stored is trusted: the SCID is re-derived, every
//! version hash is recomputed from the raw entry content, and every proof is
//! checked against the keys of the *previous* version.
//!
//! ## States
//!
//! ```text
//! Start ──▶ Genesis ──▶ Chained(2) ──▶ … ──▶ Chained(n) ──▶ Verified
//!   │          │             │                   │
//!   └──────────┴─────────────┴───────────────────┴──▶ Broken { at_version }
//! ```
//!
//! `Broken` is sticky. Entries pushed after a break are ignored, so no trust
//! is granted past the first failing version.

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use tdw_core::{
    verify_scid, DidDocument, MethodConfig, Params, ParamsUpdate, TdwError, Timestamp,
};
use tdw_crypto::{
    decode_multikey, multikey_from_verification_method, verify_proof, ProofPurpose,
};

use crate::authorization::check_rotation;
use crate::log::{split_version_id, HistoryEntry};
use crate::state::{compute_version_hash, DocumentState};

/// What to verify and where to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Check entry proofs. Hash chain and parameter rules are always checked.
    pub verify_proofs: bool,
    /// Resolve at this version number instead of the latest.
    pub version_id: Option<u64>,
    /// Resolve at the last version whose time is at or before this instant.
    pub version_time: Option<Timestamp>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            verify_proofs: true,
            version_id: None,
            version_time: None,
        }
    }
}

/// Position of the verifier in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierState {
    /// Nothing consumed yet.
    Start,
    /// Version 1 accepted.
    Genesis,
    /// Version `n` (n ≥ 2) accepted.
    Chained(u64),
    /// End of input reached without a failure.
    Verified,
    /// Verification stopped at `at_version`.
    Broken { at_version: u64 },
}

/// Summary of a verified history at the resolved version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    /// Time of version 1.
    pub created: Timestamp,
    /// Time of the resolved version.
    pub updated: Timestamp,
    pub deactivated: bool,
    #[serde(serialize_with = "version_number_as_string")]
    pub version_id: u64,
    #[serde(skip)]
    pub scid: String,
    #[serde(skip)]
    pub version_hash: String,
    #[serde(skip)]
    pub update_keys: Vec<String>,
}

fn version_number_as_string<S: Serializer>(n: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&n.to_string())
}

/// Incremental verifier over history entries.
#[derive(Debug)]
pub struct HistoryVerifier {
    options: VerifyOptions,
    config: MethodConfig,
    state: VerifierState,
    current: Option<DocumentState>,
    created: Option<Timestamp>,
    error: Option<TdwError>,
    /// The requested version was reached; later entries are not consumed.
    resolved: bool,
}

impl HistoryVerifier {
    pub fn new(options: VerifyOptions, config: MethodConfig) -> Self {
        Self {
            options,
            config,
            state: VerifierState::Start,
            current: None,
            created: None,
            error: None,
            resolved: false,
        }
    }

    pub fn state(&self) -> VerifierState {
        self.state
    }

    /// The last accepted version, if any.
    pub fn current(&self) -> Option<&DocumentState> {
        self.current.as_ref()
    }

    /// True once further input cannot change the outcome: the log is broken,
    /// ended, or the requested version has been reached.
    pub fn is_settled(&self) -> bool {
        self.resolved || matches!(self.state, VerifierState::Verified | VerifierState::Broken { .. })
    }

    /// Position the next pushed entry must occupy.
    fn next_position(&self) -> u64 {
        self.current().map_or(1, |s| s.version_number() + 1)
    }

    /// Record that the next entry could not be read at all.
    pub fn reject(&mut self, reason: TdwError) -> VerifierState {
        if self.is_settled() {
            return self.state;
        }
        let position = self.next_position();
        tracing::warn!(version_id = position, error = %reason, "unreadable history entry");
        self.error = Some(reason.broken_at(position));
        self.state = VerifierState::Broken {
            at_version: position,
        };
        self.state
    }

    /// Consume the next entry of the log.
    pub fn push(&mut self, entry: HistoryEntry) -> VerifierState {
        if self.is_settled() {
            return self.state;
        }
        let position = self.next_position();

        if let Some(limit) = self.options.version_time {
            match Timestamp::parse(&entry.version_time) {
                Ok(t) if t > limit => {
                    self.resolved = true;
                    return self.state;
                }
                _ => {}
            }
        }

        match self.check_entry(position, &entry) {
            Ok(next) => {
                tracing::debug!(
                    did = %next.document_id(),
                    version_id = position,
                    "verified history entry"
                );
                if self.created.is_none() {
                    self.created = Some(next.timestamp());
                }
                self.current = Some(next);
                self.state = if position == 1 {
                    VerifierState::Genesis
                } else {
                    VerifierState::Chained(position)
                };
                if self.options.version_id == Some(position) {
                    self.resolved = true;
                }
            }
            Err(err) => {
                tracing::warn!(version_id = position, error = %err, "history broken");
                self.error = Some(err.broken_at(position));
                self.state = VerifierState::Broken {
                    at_version: position,
                };
            }
        }
        self.state
    }

    /// Signal end of input. An empty history breaks at version 0.
    pub fn end(&mut self) -> VerifierState {
        match self.state {
            VerifierState::Start => {
                let reason = if self.resolved {
                    TdwError::InvalidTimestamp(
                        "no version at or before the requested time".into(),
                    )
                } else {
                    TdwError::InvalidGenesisFormat("history is empty".into())
                };
                self.error = Some(reason.broken_at(0));
                self.state = VerifierState::Broken { at_version: 0 };
            }
            VerifierState::Genesis | VerifierState::Chained(_) => {
                self.state = VerifierState::Verified;
            }
            VerifierState::Verified | VerifierState::Broken { .. } => {}
        }
        self.state
    }

    /// End the input and return the resolved state and its metadata.
    ///
    /// # Errors
    ///
    /// The recorded `ChainBroken`; `ChainBroken { at_version: 0 }` when no
    /// version qualifies; `InvalidParams` when the requested version is past
    /// the end of the log.
    pub fn finish(mut self) -> Result<(DocumentState, HistoryMetadata), TdwError> {
        self.end();
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let (Some(state), Some(created)) = (self.current.take(), self.created) else {
            return Err(TdwError::InvalidGenesisFormat("no version resolved".into()).broken_at(0));
        };
        if let Some(requested) = self.options.version_id {
            if state.version_number() != requested {
                return Err(TdwError::InvalidParams(format!(
                    "version {requested} not found, history ends at version {}",
                    state.version_number()
                )));
            }
        }
        let metadata = HistoryMetadata {
            created,
            updated: state.timestamp(),
            deactivated: state.is_deactivated(),
            version_id: state.version_number(),
            scid: state.scid().to_string(),
            version_hash: state.version_hash().to_string(),
            update_keys: state.params().update_keys.clone(),
        };
        tracing::info!(
            did = %state.document_id(),
            version_id = metadata.version_id,
            deactivated = metadata.deactivated,
            "history verified"
        );
        Ok((state, metadata))
    }

    fn check_entry(&self, position: u64, entry: &HistoryEntry) -> Result<DocumentState, TdwError> {
        let (number, declared_hash) =
            split_version_id(&entry.version_id).ok_or_else(|| TdwError::IdentifierMismatch {
                expected: format!("{position}-<hash>"),
                found: entry.version_id.clone(),
            })?;
        if number != position {
            return Err(TdwError::IdentifierMismatch {
                expected: format!("{position}-<hash>"),
                found: entry.version_id.clone(),
            });
        }

        let timestamp = Timestamp::parse(&entry.version_time)?;
        let params_update = ParamsUpdate::from_value(entry.parameters.clone())?;
        let document = DidDocument::from_value(entry.state.clone())?;

        let (params, predecessor, authorizing_keys) = match &self.current {
            None => self.check_genesis(entry, &params_update)?,
            Some(prior) => {
                if prior.is_deactivated() {
                    return Err(TdwError::InvalidParams(format!(
                        "{} was deactivated at version {}",
                        prior.document_id(),
                        prior.version_number()
                    )));
                }
                if document.id != prior.document_id() {
                    return Err(TdwError::IdentifierMismatch {
                        expected: prior.document_id().to_string(),
                        found: document.id,
                    });
                }
                if timestamp < prior.timestamp() {
                    return Err(TdwError::NonMonotonicTimestamp {
                        previous: prior.timestamp(),
                        given: timestamp,
                    });
                }
                let params = prior.params().apply(&params_update)?;
                check_rotation(prior.params(), &params)?;
                (
                    params,
                    prior.version_id(),
                    prior.params().update_keys.clone(),
                )
            }
        };

        let version_hash = compute_version_hash(
            &predecessor,
            &entry.version_time,
            &entry.parameters,
            &entry.state,
            params.hash,
        )?;
        if version_hash != declared_hash {
            return Err(TdwError::IdentifierMismatch {
                expected: format!("{position}-{version_hash}"),
                found: entry.version_id.clone(),
            });
        }

        if self.options.verify_proofs {
            check_proofs(entry, &authorizing_keys)?;
        }

        Ok(DocumentState::from_parts(
            position,
            version_hash,
            predecessor,
            timestamp,
            document,
            params,
            params_update,
            authorizing_keys,
            entry.proof.clone(),
        ))
    }

    fn check_genesis(
        &self,
        entry: &HistoryEntry,
        params_update: &ParamsUpdate,
    ) -> Result<(Params, String, Vec<String>), TdwError> {
        let params = Params::genesis(params_update, &self.config)?;
        if let Some(len) = params.scid_length {
            if len != params.scid.len() {
                return Err(TdwError::IdentifierMismatch {
                    expected: format!("SCID of length {len}"),
                    found: params.scid.clone(),
                });
            }
        }
        verify_scid(
            &params.scid,
            &entry.state,
            &entry.parameters,
            params.hash,
            &self.config,
        )?;
        let keys = params.update_keys.clone();
        let scid = params.scid.clone();
        Ok((params, scid, keys))
    }
}

/// Every proof must verify; at least one must come from `authorizing_keys`.
fn check_proofs(entry: &HistoryEntry, authorizing_keys: &[String]) -> Result<(), TdwError> {
    let unsecured = unsecured_entry(entry);
    let mut authorized = false;
    for proof in &entry.proof {
        if proof.purpose() != Some(ProofPurpose::Authentication) {
            return Err(TdwError::ProofInvalid(format!(
                "history proof purpose must be authentication, found {:?}",
                proof.proof_purpose
            )));
        }
        let multikey = multikey_from_verification_method(&proof.verification_method)
            .ok_or_else(|| {
                TdwError::ProofInvalid(format!(
                    "verification method {:?} is not a did:key reference",
                    proof.verification_method
                ))
            })?;
        let public_key = decode_multikey(multikey)
            .map_err(|e| TdwError::ProofInvalid(e.to_string()))?;
        verify_proof(&unsecured, proof, &public_key)
            .map_err(|e| TdwError::ProofInvalid(e.to_string()))?;
        authorized |= authorizing_keys.iter().any(|k| k == multikey);
    }
    if !authorized {
        return Err(TdwError::UnauthorizedKeyRotation(format!(
            "no proof on version {} is from an authorized update key",
            entry.version_id
        )));
    }
    Ok(())
}

fn unsecured_entry(entry: &HistoryEntry) -> Value {
    json!({
        "versionId": entry.version_id,
        "versionTime": entry.version_time,
        "parameters": entry.parameters,
        "state": entry.state,
    })
}

/// Verify a complete sequence of entries.
pub fn verify_history(
    entries: impl IntoIterator<Item = HistoryEntry>,
    options: VerifyOptions,
    config: &MethodConfig,
) -> Result<(DocumentState, HistoryMetadata), TdwError> {
    let mut verifier = HistoryVerifier::new(options, config.clone());
    for entry in entries {
        verifier.push(entry);
        if verifier.is_settled() {
            break;
        }
    }
    verifier.finish()
}
