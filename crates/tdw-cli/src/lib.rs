//! # tdw-cli — Command-Line Interface for did:tdw
//!
//! Provides the `tdw` binary.
//!
//! ## Subcommands
//!
//! - `tdw provision --auto` — Create a DID directory with a key store, a
//!   signed genesis version and the resolved document.
//! - `tdw update` — Append a version signed with a stored update key,
//!   optionally rotating keys or deactivating.
//! - `tdw verify` — Verify a history log and print its metadata.
//! - `tdw resolve` — Resolve a history log at a version number or time.
//! - `tdw demo` — Run the three-version walkthrough and write a DID
//!   configuration.
//!
//! ```bash
//! tdw provision --auto example.com
//! tdw update --dir example.com:<scid> --rotate
//! tdw verify example.com:<scid>/did.jsonl
//! tdw resolve example.com:<scid>/did.jsonl --version-id 1
//! ```

pub mod demo;
pub mod provision;
pub mod resolve;
pub mod update;

use std::path::Path;

use anyhow::{Context, Result};

use tdw_core::MethodConfig;

/// Load the method configuration from `path`, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<MethodConfig> {
    let config = match path {
        Some(path) => MethodConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => MethodConfig::default(),
    };
    config.validate().context("invalid method configuration")?;
    Ok(config)
}
