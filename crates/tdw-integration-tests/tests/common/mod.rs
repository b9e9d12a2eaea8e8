//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};

use tdw_core::{DidDocument, MethodConfig, ParamsUpdate, Timestamp};
use tdw_crypto::{
    did_key_verification_method, sign_document, Ed25519KeyPair, InMemorySigner, ProofPurpose,
    Signer,
};
use tdw_state::{compute_version_hash, provision_did, genesis_document, DocumentState, HistoryEntry};

pub const PLACEHOLDER_DID: &str = "did:tdw:example.com:{SCID}";

pub fn key(seed: u8) -> InMemorySigner {
    InMemorySigner::new(Ed25519KeyPair::from_seed(&[seed; 32]))
}

pub fn at(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

/// A signed genesis state for `PLACEHOLDER_DID` with `signer` as the only
/// update key.
pub fn genesis(signer: &InMemorySigner, params: ParamsUpdate, time: &str) -> DocumentState {
    let config = MethodConfig::default();
    let params = params.with_update_keys(vec![signer.multikey().to_string()]);
    provision_did(
        genesis_document(PLACEHOLDER_DID, &config),
        params,
        Some(at(time)),
        None,
        &config,
    )
    .unwrap()
    .sign(signer)
    .unwrap()
}

/// Append a version that only changes a document member.
pub fn touch(prior: &DocumentState, n: u64, signer: &dyn Signer, time: &str) -> DocumentState {
    let doc: DidDocument = prior.document_copy().with_extra("revision", json!(n));
    prior
        .next(doc, None, Some(at(time)))
        .unwrap()
        .sign(signer)
        .unwrap()
}

/// Build a correctly hashed and signed entry after `prior` without any of the
/// checks `DocumentState::next` applies. Used to produce logs a well-behaved
/// writer would refuse to write.
pub fn forge_entry(
    prior: &DocumentState,
    parameters: Value,
    state: Value,
    version_time: &str,
    signer: &dyn Signer,
) -> HistoryEntry {
    let hash = compute_version_hash(
        &prior.version_id(),
        version_time,
        &parameters,
        &state,
        prior.params().hash,
    )
    .unwrap();
    let version_id = format!("{}-{hash}", prior.version_number() + 1);
    let input = json!({
        "versionId": version_id,
        "versionTime": version_time,
        "parameters": parameters,
        "state": state,
    });
    let proof = sign_document(
        &input,
        signer,
        &did_key_verification_method(signer.multikey()),
        ProofPurpose::Authentication,
        at(version_time),
    )
    .unwrap();
    HistoryEntry {
        version_id,
        version_time: version_time.to_string(),
        parameters,
        state,
        proof: vec![proof],
    }
}

pub fn entries(states: &[&DocumentState]) -> Vec<HistoryEntry> {
    states.iter().map(|s| s.history_entry().unwrap()).collect()
}
