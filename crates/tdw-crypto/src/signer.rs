//! # Signer Capability
//!
//! The state engine never holds private keys. It receives a `&dyn Signer`:
//! something with a key id and a multikey that can sign a payload. Two
//! backends implement it:
//!
//! - [`InMemorySigner`] owns a key pair for the lifetime of the value.
//! - [`crate::keystore::StoreSigner`] unseals its seed from the key store
//!   for each signature and drops it immediately afterwards.

use crate::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, KeyAlgorithm, SigningPayload};
use crate::error::CryptoError;
use crate::multikey::did_key_verification_method;

/// A signing capability identified by a key id.
pub trait Signer: Send + Sync {
    /// Key identifier, `<controller>#<fragment>`.
    fn kid(&self) -> &str;

    /// Public key as a multikey string.
    fn multikey(&self) -> &str;

    /// Signature algorithm of the key.
    fn algorithm(&self) -> KeyAlgorithm;

    /// Sign a prepared payload.
    fn sign(&self, payload: &SigningPayload) -> Result<Ed25519Signature, CryptoError>;
}

/// A signer holding its key pair in memory.
#[derive(Debug)]
pub struct InMemorySigner {
    kid: String,
    multikey: String,
    keypair: Ed25519KeyPair,
}

impl InMemorySigner {
    /// Wrap a key pair. The kid defaults to the `did:key` form of the key.
    pub fn new(keypair: Ed25519KeyPair) -> Self {
        let multikey = keypair.public_key().to_multikey();
        Self {
            kid: did_key_verification_method(&multikey),
            multikey,
            keypair,
        }
    }

    /// Generate a fresh key for `algorithm`.
    pub fn generate(algorithm: KeyAlgorithm) -> Self {
        match algorithm {
            KeyAlgorithm::Ed25519 => Self::new(Ed25519KeyPair::generate()),
        }
    }

    /// Replace the key id.
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = kid.into();
        self
    }

    /// The public half of the key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Borrow the key pair, for handing it to a key store.
    pub fn keypair(&self) -> &Ed25519KeyPair {
        &self.keypair
    }
}

impl Signer for InMemorySigner {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn multikey(&self) -> &str {
        &self.multikey
    }

    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ed25519
    }

    fn sign(&self, payload: &SigningPayload) -> Result<Ed25519Signature, CryptoError> {
        Ok(self.keypair.sign(payload))
    }
}
