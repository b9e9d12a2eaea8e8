//! # Key Authorization Model
//!
//! Decides who may sign a version and which new update keys a version may
//! introduce.
//!
//! ## Rules
//!
//! - A version is authorized by the `updateKeys` in force *before* it. Only
//!   version 1, which has no predecessor, is authorized by its own keys. A
//!   single signature therefore cannot both add a key and use it.
//! - When the prior version publishes `nextKeyHashes`, any update key that
//!   was not already authorized must hash to one of those commitments.

use tdw_core::{Params, TdwError};
use tdw_crypto::{next_key_hash, Signer};

/// Whether `signer_multikey` is one of the update keys of `params`.
pub fn is_authorized(params: &Params, signer_multikey: &str) -> bool {
    params.update_keys.iter().any(|k| k == signer_multikey)
}

/// Check that every update key introduced by `new` was committed to by
/// `prior`.
///
/// # Errors
///
/// `UnauthorizedKeyRotation` naming the first key without a matching
/// commitment.
pub fn check_rotation(prior: &Params, new: &Params) -> Result<(), TdwError> {
    if !prior.requires_prerotation() {
        return Ok(());
    }
    let commitments = prior.next_key_hashes();
    for key in &new.update_keys {
        if is_authorized(prior, key) {
            continue;
        }
        let digest = next_key_hash(key, prior.hash);
        if !commitments.contains(&digest) {
            tracing::warn!(key = %key, "update key does not match any pre-rotation commitment");
            return Err(TdwError::UnauthorizedKeyRotation(format!(
                "update key {key} is not in the prior version's nextKeyHashes"
            )));
        }
    }
    Ok(())
}

/// Check that `signer` belongs to `authorizing_keys`.
///
/// # Errors
///
/// `UnauthorizedKeyRotation` when it does not.
pub fn authorize_signer(authorizing_keys: &[String], signer: &dyn Signer) -> Result<(), TdwError> {
    if authorizing_keys.iter().any(|k| k == signer.multikey()) {
        Ok(())
    } else {
        Err(TdwError::UnauthorizedKeyRotation(format!(
            "signer {} is not an authorized update key",
            signer.kid()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tdw_core::{MethodConfig, ParamsUpdate};
    use tdw_crypto::{Ed25519KeyPair, InMemorySigner};

    fn mk(seed: u8) -> String {
        Ed25519KeyPair::from_seed(&[seed; 32]).public_key().to_multikey()
    }

    fn params(keys: Vec<String>, next: Option<Vec<String>>) -> Params {
        let mut update = ParamsUpdate {
            method: Some("did:tdw:1".into()),
            scid: Some("scid".into()),
            ..ParamsUpdate::default()
        }
        .with_update_keys(keys);
        if let Some(next) = next {
            update = update.with_next_key_hashes(next);
        }
        Params::genesis(&update, &MethodConfig::default()).unwrap()
    }

    fn commit(key: &str) -> String {
        next_key_hash(key, tdw_core::HashAlgorithm::Sha256)
    }

    #[test]
    fn test_membership() {
        let p = params(vec![mk(1)], None);
        assert!(is_authorized(&p, &mk(1)));
        assert!(!is_authorized(&p, &mk(2)));
    }

    #[test]
    fn test_rotation_without_commitments_is_free() {
        let prior = params(vec![mk(1)], None);
        let new = params(vec![mk(2), mk(3)], None);
        check_rotation(&prior, &new).unwrap();
    }

    #[test]
    fn test_rotation_to_committed_key() {
        let prior = params(vec![mk(1)], Some(vec![commit(&mk(2))]));
        let new = params(vec![mk(2)], None);
        check_rotation(&prior, &new).unwrap();
    }

    #[test]
    fn test_rotation_to_uncommitted_key_fails() {
        let prior = params(vec![mk(1)], Some(vec![commit(&mk(2))]));
        let new = params(vec![mk(3)], None);
        assert!(matches!(
            check_rotation(&prior, &new),
            Err(TdwError::UnauthorizedKeyRotation(_))
        ));
    }

    #[test]
    fn test_keeping_existing_keys_needs_no_commitment() {
        let prior = params(vec![mk(1)], Some(vec![commit(&mk(2))]));
        let new = params(vec![mk(1), mk(2)], None);
        check_rotation(&prior, &new).unwrap();
    }

    #[test]
    fn test_authorize_signer() {
        let signer = InMemorySigner::new(Ed25519KeyPair::from_seed(&[1; 32]));
        authorize_signer(&[mk(1)], &signer).unwrap();
        assert!(matches!(
            authorize_signer(&[mk(2)], &signer),
            Err(TdwError::UnauthorizedKeyRotation(_))
        ));
        assert!(authorize_signer(&[], &signer).is_err());
    }
}
