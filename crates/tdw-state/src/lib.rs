//! # tdw-state — Versioned Document State Engine
//!
//! The core of did:tdw: a chain of immutable [`DocumentState`] versions, each
//! bound to its predecessor by hash and authenticated by proofs from keys the
//! predecessor authorized.
//!
//! ## Modules
//!
//! - **Authorization** (`authorization.rs`): update-key membership and the
//!   pre-rotation commitment check.
//!
//! - **State** (`state.rs`): `initial`, `next`, `deactivate`, signing, and the
//!   version hash.
//!
//! - **Log** (`log.rs`): the JSON Lines history format and file I/O.
//!
//! - **History** (`history.rs`): the verifier state machine
//!   `Start → Genesis → Chained(n) → Verified | Broken`, and resolution at a
//!   version number or time.
//!
//! - **Provision** (`provision.rs`): placeholder normalization, genesis
//!   documents, verification-method encoding, automatic provisioning with a
//!   key store, and key rotation.
//!
//! ## Key Design Principles
//!
//! 1. **States are values.** `next` borrows the prior state and returns a new
//!    one; nothing in the chain is mutated after it is produced.
//!
//! 2. **Authorization looks back.** A version is signed by the update keys of
//!    the version before it, never by keys it introduces itself.
//!
//! 3. **Recompute, never trust.** The verifier re-derives the SCID and every
//!    version hash from raw log content and stops at the first divergence.
//!
//! ## Crate Policy
//!
//! - Signing goes through `&dyn Signer`; this crate never sees a private key.
//! - Errors are `TdwError`; verification failures are `ChainBroken`.

pub mod authorization;
pub mod history;
pub mod log;
pub mod provision;
pub mod state;

// ─── Chain ──────────────────────────────────────────────────────────

pub use authorization::{authorize_signer, check_rotation, is_authorized};
pub use state::{compute_version_hash, DocumentState};

// ─── Log and verification ───────────────────────────────────────────

pub use history::{verify_history, HistoryMetadata, HistoryVerifier, VerifierState, VerifyOptions};
pub use log::{
    history_dir, load_history_path, read_history, split_version_id, write_document_state,
    HistoryEntry,
};

// ─── Provisioning ───────────────────────────────────────────────────

pub use provision::{
    add_auth_key, auto_provision_did, encode_verification_method, find_update_signer,
    genesis_document, normalize_provision_id, provision_did, rotate_to_committed_key,
    AutoProvisionOptions, KeyRotation, NEXT_KEY_TAG,
};
