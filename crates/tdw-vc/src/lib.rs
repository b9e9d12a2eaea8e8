//! # tdw-vc — Verifiable Credentials
//!
//! - **Credential** (`credential.rs`): a VC Data Model 2.0 envelope with
//!   `eddsa-jcs-2022` Data Integrity proofs, signed through a `Signer`.
//!
//! - **DID Configuration** (`did_configuration.rs`): the Well-Known DID
//!   Configuration resource linking a did:tdw DID to a web origin.
//!
//! ## Crate Policy
//!
//! - Depends on `tdw-core` and `tdw-crypto` internally.
//! - `credentialSubject` stays free-form JSON.
//! - Credentials are treated as ordinary signed documents; no status lists,
//!   no revocation, no linked-data processing.

pub mod credential;
pub mod did_configuration;

pub use credential::{ProofResult, VcError, VerifiableCredential, CREDENTIALS_V2_CONTEXT};
pub use did_configuration::{
    create_did_configuration, verify_did_configuration, DidConfiguration,
    DID_CONFIGURATION_CONTEXT,
};
