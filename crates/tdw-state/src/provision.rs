//! # Provisioning
//!
//! Turns a domain or placeholder DID into a signed, persisted version 1, and
//! provides the key-handling steps an update needs: finding a stored key that
//! may sign, and rotating to a pre-committed next key.
//!
//! Keys created here go into the DID's key store. Each pre-rotation key is
//! tagged `hash=<commitment>` so a later rotation can find it from the
//! `nextKeyHashes` alone.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use tdw_core::{
    check_document_id_format, is_valid_domain, DidDocument, HashAlgorithm, MethodConfig, Params,
    ParamsUpdate, TdwError, Timestamp, VerificationMethod, VerificationRelationship,
    SCID_PLACEHOLDER,
};
use tdw_crypto::{
    multikey_fragment, next_key_hash, InMemorySigner, KeyAlgorithm, KeySession, KeyStore, Signer,
    StoreSigner,
};

use crate::history::VerifyOptions;
use crate::log::{history_dir, load_history_path, write_document_state};
use crate::state::DocumentState;

/// Tag carrying a pre-rotation key's commitment.
pub const NEXT_KEY_TAG: &str = "hash";

/// Stand-in SCID used to syntax-check a placeholder DID.
const STAND_IN_SCID: &str = "__SCID__";

/// Turn a domain or a placeholder DID into a placeholder DID.
///
/// # Errors
///
/// `InvalidGenesisFormat` for a DID without the placeholder, an invalid
/// domain, or a DID that is malformed once the placeholder is filled.
pub fn normalize_provision_id(domain_or_did: &str, config: &MethodConfig) -> Result<String, TdwError> {
    if !domain_or_did.contains(SCID_PLACEHOLDER) {
        if domain_or_did.contains(':') {
            return Err(TdwError::InvalidGenesisFormat(
                "missing SCID placeholder".into(),
            ));
        }
        if !is_valid_domain(domain_or_did) {
            return Err(TdwError::InvalidGenesisFormat(format!(
                "invalid domain name: {domain_or_did}"
            )));
        }
        return Ok(format!("{}{domain_or_did}:{SCID_PLACEHOLDER}", config.did_prefix()));
    }
    let did = if domain_or_did.starts_with("did:") {
        domain_or_did.to_string()
    } else {
        format!("{}{domain_or_did}", config.did_prefix())
    };
    check_document_id_format(
        &did.replace(SCID_PLACEHOLDER, STAND_IN_SCID),
        STAND_IN_SCID,
        config,
    )
    .map_err(|e| match e {
        TdwError::IdentifierMismatch { .. } => TdwError::InvalidGenesisFormat(format!(
            "SCID placeholder must be the last segment of {did}"
        )),
        other => other,
    })?;
    Ok(did)
}

/// The standard genesis document for a placeholder DID.
pub fn genesis_document(placeholder_id: &str, config: &MethodConfig) -> DidDocument {
    DidDocument::new(placeholder_id)
        .with_context(config.did_context.as_str())
        .with_context(config.multikey_context.as_str())
}

/// Create version 1 of a DID, setting the `method` parameter.
///
/// # Errors
///
/// `InvalidParams` when `params` names a different method; otherwise as for
/// [`DocumentState::initial`].
pub fn provision_did(
    document: DidDocument,
    mut params: ParamsUpdate,
    timestamp: Option<Timestamp>,
    scid_length: Option<usize>,
    config: &MethodConfig,
) -> Result<DocumentState, TdwError> {
    let method = config.method_param();
    if params.method.as_deref().is_some_and(|m| m != method) {
        return Err(TdwError::InvalidParams(
            "cannot override 'method' parameter".into(),
        ));
    }
    params.method = Some(method);
    DocumentState::initial(document, params, timestamp, scid_length, config)
}

/// Build a `Multikey` verification method.
///
/// Without a `kid` the id is the deterministic fragment of the key. A kid of
/// the form `<prefix>#<fragment>` makes `<prefix>` the controller; a bare
/// `#<fragment>` is prefixed with `controller`.
///
/// # Errors
///
/// `InvalidParams` when `kid` has no fragment.
pub fn encode_verification_method(
    multikey: &str,
    kid: Option<&str>,
    controller: Option<&str>,
) -> Result<VerificationMethod, TdwError> {
    let kid = match kid {
        Some(kid) => kid.to_string(),
        None => multikey_fragment(multikey)?,
    };
    let (id, controller) = match kid.find('#') {
        None => {
            return Err(TdwError::InvalidParams(format!(
                "missing fragment in verification method id {kid:?}"
            )))
        }
        Some(0) => {
            let controller = controller.unwrap_or_default();
            (format!("{controller}{kid}"), controller.to_string())
        }
        Some(pos) => (kid.clone(), kid[..pos].to_string()),
    };
    Ok(VerificationMethod {
        id,
        type_: "Multikey".to_string(),
        controller,
        public_key_multibase: Some(multikey.to_string()),
        extra: Map::new(),
    })
}

/// Add `signer`'s key as a verification method and reference it from
/// `authentication`.
pub fn add_auth_key(document: DidDocument, signer: &dyn Signer) -> Result<DidDocument, TdwError> {
    let vm = encode_verification_method(signer.multikey(), Some(signer.kid()), Some(&document.id))?;
    let reference = VerificationRelationship::Reference(vm.id.clone());
    Ok(document
        .with_verification_method(vm)
        .with_authentication(reference))
}

/// Options for [`auto_provision_did`].
#[derive(Debug, Clone, Default)]
pub struct AutoProvisionOptions {
    /// Enable pre-rotation and commit to a generated next key.
    pub prerotation: bool,
    /// Hash algorithm to publish in the parameters.
    pub hash: Option<HashAlgorithm>,
    pub scid_length: Option<usize>,
    /// Additional genesis parameters.
    pub extra_params: Map<String, Value>,
}

/// Generate keys, derive the DID, and persist a signed version 1.
///
/// The DID directory is created under `base_dir` and must not exist yet. It
/// receives the key store, the history log and the resolved document. The
/// log is verified again after writing.
///
/// Returns the directory, the signed state and the update key's signer.
pub fn auto_provision_did(
    placeholder_id: &str,
    key_alg: KeyAlgorithm,
    pass_key: &str,
    options: AutoProvisionOptions,
    base_dir: &Path,
    config: &MethodConfig,
) -> Result<(PathBuf, DocumentState, InMemorySigner), TdwError> {
    let update_key = InMemorySigner::generate(key_alg);
    let hash = options.hash.unwrap_or(config.default_hash);

    let mut params = ParamsUpdate {
        extra: options.extra_params,
        ..ParamsUpdate::default()
    }
    .with_update_keys(vec![update_key.multikey().to_string()]);
    if let Some(h) = options.hash {
        params = params.with_hash(h);
    }
    let next_key = if options.prerotation {
        let next = InMemorySigner::generate(key_alg);
        let commitment = next_key_hash(next.multikey(), hash);
        params = params
            .with_prerotation(true)
            .with_next_key_hashes(vec![commitment.clone()]);
        Some((next, commitment))
    } else {
        None
    };

    let state = provision_did(
        genesis_document(placeholder_id, config),
        params,
        None,
        options.scid_length,
        config,
    )?;
    let dir = history_dir(state.document_id(), base_dir, config)?;
    fs::create_dir_all(base_dir)?;
    fs::create_dir(&dir)?;

    let store = KeyStore::provision(&dir.join(&config.keystore_filename), pass_key)?;
    {
        let mut session = store.session()?;
        session.insert_key(update_key.kid(), update_key.keypair(), BTreeMap::new())?;
        if let Some((next, commitment)) = &next_key {
            let tags = BTreeMap::from([(NEXT_KEY_TAG.to_string(), commitment.clone())]);
            session.insert_key(next.kid(), next.keypair(), tags)?;
        }
    }
    store.close()?;

    let state = state.sign(&update_key)?;
    write_document_state(&dir, &state, config)?;
    load_history_path(
        &dir.join(&config.history_filename),
        VerifyOptions::default(),
        config,
    )?;
    tracing::info!(
        did = %state.document_id(),
        path = %dir.display(),
        prerotation = options.prerotation,
        "provisioned DID"
    );
    Ok((dir, state, update_key))
}

/// A stored key that is one of the current update keys.
///
/// # Errors
///
/// `UnauthorizedKeyRotation` when the store holds none of them.
pub fn find_update_signer(session: &KeySession<'_>, params: &Params) -> Result<StoreSigner, TdwError> {
    for kid in session.list_kids() {
        if let Some(stored) = session.fetch_key(&kid)? {
            if params.update_keys.contains(&stored.multikey) {
                return Ok(session.signer(&kid)?);
            }
        }
    }
    Err(TdwError::UnauthorizedKeyRotation(
        "no stored key is a current update key".into(),
    ))
}

/// The parameter change of a rotation, and the fresh pre-rotation key it
/// commits to.
///
/// The fresh key is not in the key store yet. Call
/// [`KeyRotation::store_next_key`] once the version carrying `update` has
/// been written, so a failed update leaves no orphan key behind.
#[derive(Debug)]
pub struct KeyRotation {
    pub update: ParamsUpdate,
    next_key: Option<(InMemorySigner, String)>,
}

impl KeyRotation {
    /// Persist the generated next key with its commitment tag.
    pub fn store_next_key(self, session: &mut KeySession<'_>) -> Result<(), TdwError> {
        if let Some((next, commitment)) = self.next_key {
            let tags = BTreeMap::from([(NEXT_KEY_TAG.to_string(), commitment)]);
            session.insert_key(next.kid(), next.keypair(), tags)?;
            tracing::info!(kid = %next.kid(), "stored next pre-rotation key");
        }
        Ok(())
    }
}

/// Switch the update keys to the stored keys committed in
/// `params.nextKeyHashes`.
///
/// While pre-rotation is on, a fresh next key is generated and published as
/// the new `nextKeyHashes`. Otherwise the commitments are cleared.
///
/// # Errors
///
/// `InvalidParams` when nothing is committed, `UnauthorizedKeyRotation` when
/// no committed key is in the store.
pub fn rotate_to_committed_key(
    session: &KeySession<'_>,
    params: &Params,
    key_alg: KeyAlgorithm,
) -> Result<KeyRotation, TdwError> {
    let commitments = params.next_key_hashes();
    if commitments.is_empty() {
        return Err(TdwError::InvalidParams(
            "no nextKeyHashes to rotate to".into(),
        ));
    }
    let mut update_keys = Vec::new();
    for commitment in commitments {
        for stored in session.find_by_tag(NEXT_KEY_TAG, commitment)? {
            if next_key_hash(&stored.multikey, params.hash) == *commitment {
                update_keys.push(stored.multikey);
            }
        }
    }
    if update_keys.is_empty() {
        return Err(TdwError::UnauthorizedKeyRotation(
            "no committed next key found in the key store".into(),
        ));
    }

    let update = ParamsUpdate::new().with_update_keys(update_keys);
    if !params.prerotation {
        return Ok(KeyRotation {
            update: update.with_next_key_hashes(Vec::new()),
            next_key: None,
        });
    }
    let next = InMemorySigner::generate(key_alg);
    let commitment = next_key_hash(next.multikey(), params.hash);
    Ok(KeyRotation {
        update: update.with_next_key_hashes(vec![commitment.clone()]),
        next_key: Some((next, commitment)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tdw_crypto::Ed25519KeyPair;

    fn config() -> MethodConfig {
        MethodConfig::default()
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(
            normalize_provision_id("example.com", &config()).unwrap(),
            "did:tdw:example.com:{SCID}"
        );
        assert!(matches!(
            normalize_provision_id("localhost", &config()),
            Err(TdwError::InvalidGenesisFormat(_))
        ));
    }

    #[test]
    fn test_normalize_did_forms() {
        assert_eq!(
            normalize_provision_id("example.com:users:{SCID}", &config()).unwrap(),
            "did:tdw:example.com:users:{SCID}"
        );
        assert_eq!(
            normalize_provision_id("did:tdw:example.com:{SCID}", &config()).unwrap(),
            "did:tdw:example.com:{SCID}"
        );
        assert!(matches!(
            normalize_provision_id("did:tdw:example.com:abc", &config()),
            Err(TdwError::InvalidGenesisFormat(ref m)) if m.contains("missing SCID placeholder")
        ));
        assert!(normalize_provision_id("did:tdw:example.com:{SCID}:tail", &config()).is_err());
        assert!(normalize_provision_id("did:web:example.com:{SCID}", &config()).is_err());
    }

    #[test]
    fn test_genesis_document_contexts() {
        let doc = genesis_document("did:tdw:example.com:{SCID}", &config());
        let value = doc.to_value().unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "@context": ["https://www.w3.org/ns/did/v1", "https://w3id.org/security/multikey/v1"],
                "id": "did:tdw:example.com:{SCID}",
            })
        );
    }

    #[test]
    fn test_provision_rejects_other_method() {
        let mk = Ed25519KeyPair::from_seed(&[1; 32]).public_key().to_multikey();
        let params = ParamsUpdate {
            method: Some("did:tdw:0.9".into()),
            ..ParamsUpdate::default()
        }
        .with_update_keys(vec![mk]);
        let doc = genesis_document("did:tdw:example.com:{SCID}", &config());
        assert!(matches!(
            provision_did(doc, params, None, None, &config()),
            Err(TdwError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_encode_verification_method() {
        let mk = Ed25519KeyPair::from_seed(&[2; 32]).public_key().to_multikey();

        let vm = encode_verification_method(&mk, None, Some("did:tdw:x.com:abc")).unwrap();
        assert!(vm.id.starts_with("did:tdw:x.com:abc#"));
        assert_eq!(vm.controller, "did:tdw:x.com:abc");
        assert_eq!(vm.public_key_multibase.as_deref(), Some(mk.as_str()));

        let vm = encode_verification_method(&mk, Some("did:example:ctl#k1"), Some("ignored")).unwrap();
        assert_eq!(vm.id, "did:example:ctl#k1");
        assert_eq!(vm.controller, "did:example:ctl");

        let vm = encode_verification_method(&mk, Some("#k2"), None).unwrap();
        assert_eq!(vm.id, "#k2");
        assert_eq!(vm.controller, "");

        assert!(encode_verification_method(&mk, Some("nofragment"), None).is_err());
    }

    #[test]
    fn test_add_auth_key() {
        let signer = InMemorySigner::new(Ed25519KeyPair::from_seed(&[3; 32]))
            .with_kid("did:example:controller#key-1");
        let doc = add_auth_key(DidDocument::new("did:tdw:x.com:abc"), &signer).unwrap();
        assert!(doc.find_verification_method("did:example:controller#key-1").is_some());
        assert!(doc.has_authentication("did:example:controller#key-1"));
    }

    #[test]
    fn test_auto_provision_writes_verified_log() {
        let base = tempfile::tempdir().unwrap();
        let config = config();
        let (dir, state, signer) = auto_provision_did(
            "did:tdw:example.com:{SCID}",
            KeyAlgorithm::Ed25519,
            "pass",
            AutoProvisionOptions::default(),
            base.path(),
            &config,
        )
        .unwrap();
        assert!(dir.join(&config.history_filename).exists());
        assert!(dir.join(&config.document_filename).exists());
        assert!(dir.join(&config.keystore_filename).exists());
        assert_eq!(state.proofs().len(), 1);
        assert_eq!(state.params().update_keys, vec![signer.multikey().to_string()]);
        assert_eq!(
            dir.file_name().unwrap().to_string_lossy(),
            format!("example.com:{}", state.scid())
        );

        let store = KeyStore::open(&dir.join(&config.keystore_filename), "pass").unwrap();
        let session = store.session().unwrap();
        let found = find_update_signer(&session, state.params()).unwrap();
        assert_eq!(found.multikey(), signer.multikey());
    }

    #[test]
    fn test_auto_provision_with_prerotation_and_rotate() {
        let base = tempfile::tempdir().unwrap();
        let config = config();
        let options = AutoProvisionOptions {
            prerotation: true,
            scid_length: Some(32),
            ..AutoProvisionOptions::default()
        };
        let (dir, v1, _) = auto_provision_did(
            "did:tdw:example.com:{SCID}",
            KeyAlgorithm::Ed25519,
            "pass",
            options,
            base.path(),
            &config,
        )
        .unwrap();
        assert_eq!(v1.scid().len(), 32);
        assert!(v1.params().prerotation);
        assert_eq!(v1.params().next_key_hashes().len(), 1);

        let store = KeyStore::open(&dir.join(&config.keystore_filename), "pass").unwrap();
        let (current, rotation) = {
            let session = store.session().unwrap();
            let current = find_update_signer(&session, v1.params()).unwrap();
            let rotation =
                rotate_to_committed_key(&session, v1.params(), KeyAlgorithm::Ed25519).unwrap();
            assert_eq!(session.list_kids().len(), 2);
            (current, rotation)
        };
        let v2 = v1
            .next(v1.document_copy(), Some(rotation.update.clone()), None)
            .unwrap()
            .sign(&current)
            .unwrap();
        assert_ne!(v2.params().update_keys, v1.params().update_keys);
        assert_eq!(v2.params().next_key_hashes().len(), 1);
        assert_ne!(v2.params().next_key_hashes(), v1.params().next_key_hashes());
        write_document_state(&dir, &v2, &config).unwrap();
        rotation.store_next_key(&mut store.session().unwrap()).unwrap();
        assert_eq!(store.session().unwrap().list_kids().len(), 3);

        // the rotated-to key signs the following version
        let next_signer = {
            let session = store.session().unwrap();
            find_update_signer(&session, v2.params()).unwrap()
        };
        assert_eq!(next_signer.multikey(), v2.params().update_keys[0]);
        let v3 = v2.next(v2.document_copy(), None, None).unwrap().sign(&next_signer).unwrap();
        write_document_state(&dir, &v3, &config).unwrap();

        let (_, meta) = load_history_path(
            &dir.join(&config.history_filename),
            VerifyOptions::default(),
            &config,
        )
        .unwrap();
        assert_eq!(meta.version_id, 3);
    }

    #[test]
    fn test_rotate_without_commitment_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::provision(&dir.path().join("keys.json"), "pass").unwrap();
        let session = store.session().unwrap();
        let mk = Ed25519KeyPair::from_seed(&[1; 32]).public_key().to_multikey();
        let params = Params::genesis(
            &ParamsUpdate {
                method: Some("did:tdw:1".into()),
                scid: Some("scid".into()),
                ..ParamsUpdate::default()
            }
            .with_update_keys(vec![mk]),
            &config(),
        )
        .unwrap();
        assert!(matches!(
            rotate_to_committed_key(&session, &params, KeyAlgorithm::Ed25519),
            Err(TdwError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_each_did_gets_its_own_directory() {
        let base = tempfile::tempdir().unwrap();
        let config = config();
        let (dir, _, _) = auto_provision_did(
            "did:tdw:example.com:{SCID}",
            KeyAlgorithm::Ed25519,
            "pass",
            AutoProvisionOptions::default(),
            base.path(),
            &config,
        )
        .unwrap();
        assert!(dir.exists());
        let (other, _, _) = auto_provision_did(
            "did:tdw:example.com:{SCID}",
            KeyAlgorithm::Ed25519,
            "pass",
            AutoProvisionOptions::default(),
            base.path(),
            &config,
        )
        .unwrap();
        assert_ne!(dir, other);
    }
}
