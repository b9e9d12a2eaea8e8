//! # Provision Subcommand
//!
//! `tdw provision --auto <domain|did>` generates an update key (and a
//! committed next key with `--prerotation`), derives the SCID, and writes the
//! new DID directory: key store, history log and resolved document.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use tdw_core::{HashAlgorithm, MethodConfig};
use tdw_crypto::{KeyAlgorithm, Signer};
use tdw_state::{auto_provision_did, normalize_provision_id, AutoProvisionOptions};

/// Arguments for the `tdw provision` subcommand.
#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Domain name, or a DID containing the `{SCID}` placeholder.
    pub did: String,

    /// Generate keys and a key store automatically.
    #[arg(long)]
    pub auto: bool,

    /// Key algorithm of the generated update key.
    #[arg(long, default_value = "ed25519")]
    pub algorithm: KeyAlgorithm,

    /// Hash algorithm to publish in the genesis parameters.
    #[arg(long)]
    pub hash: Option<HashAlgorithm>,

    /// SCID length in base32 characters.
    #[arg(long)]
    pub length: Option<usize>,

    /// Commit to a next update key (pre-rotation).
    #[arg(long)]
    pub prerotation: bool,

    /// Directory in which the DID directory is created.
    #[arg(long, default_value = ".")]
    pub base_dir: PathBuf,

    /// Pass key protecting the key store.
    #[arg(long, env = "TDW_PASS_KEY", hide_env_values = true)]
    pub pass_key: String,
}

/// Execute the provision subcommand.
pub fn run_provision(args: &ProvisionArgs, config: &MethodConfig) -> Result<u8> {
    if !args.auto {
        bail!("only automatic provisioning (--auto) is currently supported");
    }
    let placeholder = normalize_provision_id(&args.did, config)
        .with_context(|| format!("invalid DID or domain: {}", args.did))?;

    let options = AutoProvisionOptions {
        prerotation: args.prerotation,
        hash: args.hash,
        scid_length: args.length,
        ..AutoProvisionOptions::default()
    };
    let (dir, state, signer) = auto_provision_did(
        &placeholder,
        args.algorithm,
        &args.pass_key,
        options,
        &args.base_dir,
        config,
    )
    .context("provisioning failed")?;

    println!("Provisioned DID in {}", dir.display());
    println!("  DID:        {}", state.document_id());
    println!("  Version:    {}", state.version_id());
    println!("  Update key: {}", signer.multikey());
    Ok(0)
}
