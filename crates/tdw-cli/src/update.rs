//! # Update Subcommand
//!
//! Appends one version to an existing DID directory. The new version is
//! signed with a key from the directory's key store that is a current update
//! key, so the history stays verifiable after every call.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use tdw_core::{DidDocument, MethodConfig};
use tdw_crypto::{KeyAlgorithm, KeyStore, Signer};
use tdw_state::{
    find_update_signer, load_history_path, rotate_to_committed_key, write_document_state,
    VerifyOptions,
};

/// Arguments for the `tdw update` subcommand.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// DID directory holding the history log and key store.
    #[arg(long)]
    pub dir: PathBuf,

    /// Replace the DID document with the JSON document in this file.
    #[arg(long)]
    pub document: Option<PathBuf>,

    /// Rotate the update keys to the committed next keys.
    #[arg(long)]
    pub rotate: bool,

    /// Deactivate the DID. No further versions can follow.
    #[arg(long, conflicts_with_all = ["document", "rotate"])]
    pub deactivate: bool,

    /// Sign with this stored key instead of the first authorized one.
    #[arg(long)]
    pub kid: Option<String>,

    /// Key algorithm for the next pre-rotation key.
    #[arg(long, default_value = "ed25519")]
    pub algorithm: KeyAlgorithm,

    /// Pass key protecting the key store.
    #[arg(long, env = "TDW_PASS_KEY", hide_env_values = true)]
    pub pass_key: String,
}

/// Execute the update subcommand.
pub fn run_update(args: &UpdateArgs, config: &MethodConfig) -> Result<u8> {
    if !args.deactivate && !args.rotate && args.document.is_none() {
        bail!("nothing to update: pass --document, --rotate or --deactivate");
    }
    let log_path = args.dir.join(&config.history_filename);
    let (prior, _) = load_history_path(&log_path, VerifyOptions::default(), config)
        .with_context(|| format!("loading history {}", log_path.display()))?;

    let document = match &args.document {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let value = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            DidDocument::from_value(value)?
        }
        None => prior.document_copy(),
    };

    let store = KeyStore::open(&args.dir.join(&config.keystore_filename), &args.pass_key)
        .context("opening key store")?;
    // The session must end before the store signer is used.
    let (signer, rotation) = {
        let session = store.session()?;
        let signer = match &args.kid {
            Some(kid) => session.signer(kid)?,
            None => find_update_signer(&session, prior.params())?,
        };
        let rotation = if args.rotate {
            Some(rotate_to_committed_key(&session, prior.params(), args.algorithm)?)
        } else {
            None
        };
        (signer, rotation)
    };

    let next = if args.deactivate {
        prior.deactivate(None)?
    } else {
        prior.next(document, rotation.as_ref().map(|r| r.update.clone()), None)?
    };
    let next = next
        .sign(&signer)
        .with_context(|| format!("signing with {}", signer.kid()))?;
    write_document_state(&args.dir, &next, config)?;
    if let Some(rotation) = rotation {
        rotation
            .store_next_key(&mut store.session()?)
            .context("storing next pre-rotation key")?;
    }
    store.close()?;

    println!("Updated {} to version {}", next.document_id(), next.version_id());
    if next.is_deactivated() {
        println!("  DID is deactivated");
    }
    Ok(0)
}
