//! # Method Configuration
//!
//! Filenames, JSON-LD contexts and method defaults, loaded from YAML or taken
//! from [`MethodConfig::default`]. Every component that needs one of these
//! values receives a `&MethodConfig` explicitly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::digest::HashAlgorithm;
use crate::error::TdwError;

/// Smallest accepted SCID length, in base32 characters.
pub const MIN_SCID_LENGTH: usize = 16;

/// Static configuration of the DID method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodConfig {
    /// Method name as it appears in the DID (`did:<method_name>:...`).
    pub method_name: String,
    /// Method version, published in the `method` parameter.
    pub method_version: u32,
    /// Name of the history log inside a DID directory.
    pub history_filename: String,
    /// Name of the resolved document written next to the log.
    pub document_filename: String,
    /// Name of the Well-Known DID Configuration output.
    pub did_configuration_filename: String,
    /// Name of the encrypted key store inside a DID directory.
    pub keystore_filename: String,
    /// DID core JSON-LD context.
    pub did_context: String,
    /// Multikey JSON-LD context.
    pub multikey_context: String,
    /// Hash algorithm used when `params.hash` is absent.
    pub default_hash: HashAlgorithm,
    /// SCID length used when neither params nor the caller supply one.
    pub default_scid_length: usize,
}

impl Default for MethodConfig {
    fn default() -> Self {
        Self {
            method_name: "tdw".to_string(),
            method_version: 1,
            history_filename: "did.jsonl".to_string(),
            document_filename: "did.json".to_string(),
            did_configuration_filename: "did-configuration.json".to_string(),
            keystore_filename: "keys.json".to_string(),
            did_context: "https://www.w3.org/ns/did/v1".to_string(),
            multikey_context: "https://w3id.org/security/multikey/v1".to_string(),
            default_hash: HashAlgorithm::Sha256,
            default_scid_length: 28,
        }
    }
}

impl MethodConfig {
    /// Parse a YAML document. Absent fields keep their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self, TdwError> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| TdwError::Config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, TdwError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TdwError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Reject values no DID could be built from.
    pub fn validate(&self) -> Result<(), TdwError> {
        if self.method_name.is_empty()
            || !self
                .method_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(TdwError::Config(format!(
                "method name must be lowercase alphanumeric, got {:?}",
                self.method_name
            )));
        }
        for (field, name) in [
            ("history_filename", &self.history_filename),
            ("document_filename", &self.document_filename),
            ("did_configuration_filename", &self.did_configuration_filename),
            ("keystore_filename", &self.keystore_filename),
        ] {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(TdwError::Config(format!(
                    "{field} must be a bare file name, got {name:?}"
                )));
            }
        }
        if self.default_scid_length < MIN_SCID_LENGTH
            || self.default_scid_length > self.default_hash.encoded_len()
        {
            return Err(TdwError::Config(format!(
                "default_scid_length {} outside {MIN_SCID_LENGTH}..={}",
                self.default_scid_length,
                self.default_hash.encoded_len()
            )));
        }
        Ok(())
    }

    /// The `method` parameter value, e.g. `did:tdw:1`.
    pub fn method_param(&self) -> String {
        format!("did:{}:{}", self.method_name, self.method_version)
    }

    /// The DID prefix, e.g. `did:tdw:`.
    pub fn did_prefix(&self) -> String {
        format!("did:{}:", self.method_name)
    }
}
