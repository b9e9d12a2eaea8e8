//! # tdw-core — Foundational Types for did:tdw
//!
//! This crate holds the pieces of the DID method that involve no keys and no
//! files: canonical JSON, content hashing, UTC timestamps, DID syntax, the
//! DID document model, method parameters, SCID derivation, and the method
//! configuration. Every other crate in the workspace depends on `tdw-core`;
//! it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **`CanonicalBytes` newtype.** Every hash and every signature is
//!    computed over JCS bytes produced by `CanonicalBytes::new()`. There is
//!    no other way to feed the hasher structured data.
//!
//! 2. **Named hash algorithms.** `HashAlgorithm` is parsed from the `hash`
//!    parameter; an unknown name is `UnsupportedAlgorithm`, never a silent
//!    fallback.
//!
//! 3. **Typed documents with an extension bag.** `DidDocument` types the
//!    members the method reads and keeps the rest verbatim, so a document
//!    survives a parse/serialize cycle byte-for-byte under JCS.
//!
//! 4. **Deltas on disk, effective params in memory.** A history entry records
//!    a `ParamsUpdate`; `Params::apply` folds it into the effective set and
//!    enforces the immutability rules.
//!
//! 5. **No ambient globals.** Filenames, contexts and defaults live in
//!    `MethodConfig` and are passed explicitly.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `tdw-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod config;
pub mod did;
pub mod digest;
pub mod document;
pub mod error;
pub mod params;
pub mod scid;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use config::{MethodConfig, MIN_SCID_LENGTH};
pub use did::{check_document_id_format, is_valid_domain, TdwDid};
pub use digest::{sha256_digest, Digest, HashAlgorithm};
pub use document::{DidDocument, OneOrMany, Service, VerificationMethod, VerificationRelationship};
pub use error::{CanonicalizationError, TdwError};
pub use params::{Params, ParamsUpdate};
pub use scid::{derive_scid, resolve_genesis, verify_scid, ResolvedGenesis, SCID_PLACEHOLDER};
pub use temporal::Timestamp;
