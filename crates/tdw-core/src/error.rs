//! # Error Types — did:tdw Failure Taxonomy
//!
//! Every failure the state engine can report is a variant of [`TdwError`].
//! Validation failures are deterministic: the same history always fails the
//! same way, so nothing here is retried and nothing is recovered silently.
//!
//! ## Design
//!
//! - Genesis and identifier problems are separated from authorization
//!   problems so callers can tell a malformed DID from a forged update.
//! - History verification wraps the first failure it sees in
//!   [`TdwError::ChainBroken`], carrying the version number at which trust
//!   stops.

use thiserror::Error;

use crate::temporal::Timestamp;

/// Top-level error type for DID provisioning, update, and verification.
#[derive(Error, Debug)]
pub enum TdwError {
    /// The genesis document or provisioning identifier is malformed
    /// (missing SCID placeholder, invalid domain, bad DID syntax).
    #[error("invalid genesis format: {0}")]
    InvalidGenesisFormat(String),

    /// A document identifier does not match the one derived or fixed at genesis.
    #[error("identifier mismatch: expected {expected}, found {found}")]
    IdentifierMismatch {
        /// The identifier required by the chain.
        expected: String,
        /// The identifier actually present.
        found: String,
    },

    /// A signer or a newly introduced update key is not authorized by the
    /// prior version.
    #[error("unauthorized key rotation: {0}")]
    UnauthorizedKeyRotation(String),

    /// A version timestamp precedes its predecessor.
    #[error("non-monotonic timestamp: {given} is earlier than previous version time {previous}")]
    NonMonotonicTimestamp {
        /// Timestamp of the prior version.
        previous: Timestamp,
        /// Timestamp supplied for the new version.
        given: Timestamp,
    },

    /// Method parameters are missing, malformed, or change an immutable value.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// A hash or key algorithm name is not recognized.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A cryptographic proof failed to verify or could not be produced.
    #[error("invalid proof: {0}")]
    ProofInvalid(String),

    /// History verification stopped at a version that failed a check.
    #[error("history broken at version {at_version}: {reason}")]
    ChainBroken {
        /// The 1-based version number at which verification failed
        /// (0 when the history is empty).
        at_version: u64,
        /// The first failure observed at that version.
        reason: Box<TdwError>,
    },

    /// A timestamp string could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The key store could not be opened, read, or updated.
    #[error("key store error: {0}")]
    KeyStore(String),

    /// Method configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TdwError {
    /// Wrap this error as the reason a history broke at `at_version`.
    ///
    /// An error that is already `ChainBroken` is returned unchanged so the
    /// earliest break point is preserved.
    pub fn broken_at(self, at_version: u64) -> Self {
        match self {
            broken @ TdwError::ChainBroken { .. } => broken,
            other => TdwError::ChainBroken {
                at_version,
                reason: Box::new(other),
            },
        }
    }

    /// For a `ChainBroken` error, the underlying reason; otherwise `self`.
    pub fn root_reason(&self) -> &TdwError {
        match self {
            TdwError::ChainBroken { reason, .. } => reason.root_reason(),
            other => other,
        }
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_broken_display_includes_version_and_reason() {
        let err = TdwError::ProofInvalid("bad signature".into()).broken_at(3);
        let msg = err.to_string();
        assert!(msg.contains("version 3"));
        assert!(msg.contains("bad signature"));
    }

    #[test]
    fn broken_at_keeps_earliest_break() {
        let err = TdwError::InvalidParams("x".into())
            .broken_at(2)
            .broken_at(5);
        match err {
            TdwError::ChainBroken { at_version, .. } => assert_eq!(at_version, 2),
            other => panic!("expected ChainBroken, got {other}"),
        }
    }

    #[test]
    fn root_reason_unwraps_chain_broken() {
        let err = TdwError::UnsupportedAlgorithm("md5".into()).broken_at(1);
        assert!(matches!(err.root_reason(), TdwError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn identifier_mismatch_display() {
        let err = TdwError::IdentifierMismatch {
            expected: "did:tdw:a".into(),
            found: "did:tdw:b".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("did:tdw:a"));
        assert!(msg.contains("did:tdw:b"));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = TdwError::from(io_err);
        assert!(err.to_string().contains("missing"));
    }
}
