//! # tdw-crypto — Keys, Signers, and Proofs
//!
//! Provides the cryptographic building blocks for did:tdw:
//!
//! - **Ed25519** key pairs, signatures, and verification over
//!   `SigningPayload`, which is only ever built from `CanonicalBytes`.
//! - **Multikey** encoding of public keys, deterministic verification-method
//!   fragments, and pre-rotation commitments.
//! - **Signer** capability trait with in-memory and key-store backends.
//! - **Key store**: a pass-key-sealed JSON file of private keys.
//! - **Data Integrity** proofs with the `eddsa-jcs-2022` cryptosuite.
//!
//! ## Crate Policy
//!
//! - Depends only on `tdw-core` internally.
//! - No mocking of cryptographic operations in tests; all tests use real
//!   Ed25519 and real AEAD.
//! - Private key material never appears in `Debug` output or logs.

pub mod data_integrity;
pub mod ed25519;
pub mod error;
pub mod keystore;
pub mod multikey;
pub mod signer;

pub use data_integrity::{sign_document, verify_proof, DataIntegrityProof, ProofPurpose};
pub use ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, KeyAlgorithm, SigningPayload};
pub use error::CryptoError;
pub use keystore::{KeySession, KeyStore, StoreSigner, StoredKey};
pub use multikey::{
    decode_multikey, did_key_verification_method, encode_multikey, multikey_fragment,
    multikey_from_verification_method, next_key_hash,
};
pub use signer::{InMemorySigner, Signer};
