//! # Crypto Errors
//!
//! Failures from key handling, signing, encoding, and the key store.

use thiserror::Error;

use tdw_core::{CanonicalizationError, TdwError};

/// Errors raised by the cryptographic layer.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key material is malformed or of the wrong length.
    #[error("key error: {0}")]
    KeyError(String),

    /// A signature did not verify.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// The key or proof algorithm is not supported.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A multibase or multikey string could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The key store rejected the operation.
    #[error("key store error: {0}")]
    KeyStore(String),

    /// Sealing or unsealing a stored secret failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Canonicalization of a proof payload failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CryptoError> for TdwError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::UnsupportedAlgorithm(msg) => TdwError::UnsupportedAlgorithm(msg),
            CryptoError::Canonicalization(e) => TdwError::Canonicalization(e),
            CryptoError::Serialization(e) => TdwError::Serialization(e),
            CryptoError::Io(e) => TdwError::Io(e),
            CryptoError::KeyStore(msg) => TdwError::KeyStore(msg),
            other => TdwError::ProofInvalid(other.to_string()),
        }
    }
}
