//! # Verify and Resolve Subcommands
//!
//! - `tdw verify <history>` checks the whole log and prints the document
//!   metadata.
//! - `tdw resolve <history>` prints the document and its metadata at the
//!   latest version, a version number, or a point in time.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use tdw_core::{MethodConfig, Timestamp};
use tdw_state::{load_history_path, VerifyOptions};

/// Arguments for the `tdw verify` subcommand.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Path to the history log (`did.jsonl`).
    pub history: PathBuf,

    /// Check the hash chain and parameters only, not the entry proofs.
    #[arg(long)]
    pub no_proofs: bool,
}

/// Arguments for the `tdw resolve` subcommand.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Path to the history log (`did.jsonl`).
    pub history: PathBuf,

    /// Resolve this version number.
    #[arg(long)]
    pub version_id: Option<u64>,

    /// Resolve the last version at or before this time (`YYYY-MM-DDTHH:MM:SSZ`).
    #[arg(long)]
    pub version_time: Option<Timestamp>,
}

/// Execute the verify subcommand.
pub fn run_verify(args: &VerifyArgs, config: &MethodConfig) -> Result<u8> {
    let options = VerifyOptions {
        verify_proofs: !args.no_proofs,
        ..VerifyOptions::default()
    };
    let (state, meta) = load_history_path(&args.history, options, config)
        .with_context(|| format!("verifying {}", args.history.display()))?;
    tracing::info!(did = %state.document_id(), version_id = meta.version_id, "history verified");
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(0)
}

/// Execute the resolve subcommand.
pub fn run_resolve(args: &ResolveArgs, config: &MethodConfig) -> Result<u8> {
    let options = VerifyOptions {
        version_id: args.version_id,
        version_time: args.version_time,
        ..VerifyOptions::default()
    };
    let (state, meta) = load_history_path(&args.history, options, config)
        .with_context(|| format!("resolving {}", args.history.display()))?;
    let output = json!({
        "didDocument": state.document(),
        "didDocumentMetadata": meta,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(0)
}
