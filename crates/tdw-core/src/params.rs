//! # Method Parameters
//!
//! Two shapes of the same data:
//!
//! - [`ParamsUpdate`] is what a history entry stores under `parameters`: only
//!   the values that change at that version (the full set at genesis).
//! - [`Params`] is the effective policy after applying every update so far.
//!
//! [`Params::apply`] is the only way to move from one effective set to the
//! next, and it enforces the immutability rules: `method`, `scid`, `hash` and
//! `scidLength` are fixed at genesis, `prerotation` can only be switched on,
//! and `deactivated` cannot be undone.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{MethodConfig, MIN_SCID_LENGTH};
use crate::digest::HashAlgorithm;
use crate::error::TdwError;

/// The parameter delta recorded in a history entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_key_hashes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerotation: Option<bool>,
    /// Hash algorithm name. Kept as text so an unknown name surfaces as
    /// `UnsupportedAlgorithm` instead of a parse error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scid_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated: Option<bool>,
    /// Cache lifetime hint for resolvers, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Parameters this implementation does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParamsUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no parameter is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, TdwError> {
        serde_json::from_value(value)
            .map_err(|e| TdwError::InvalidParams(format!("malformed parameters: {e}")))
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> Result<Value, TdwError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn with_update_keys(mut self, keys: Vec<String>) -> Self {
        self.update_keys = Some(keys);
        self
    }

    pub fn with_next_key_hashes(mut self, hashes: Vec<String>) -> Self {
        self.next_key_hashes = Some(hashes);
        self
    }

    pub fn with_prerotation(mut self, on: bool) -> Self {
        self.prerotation = Some(on);
        self
    }

    pub fn with_hash(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash = Some(algorithm.as_str().to_string());
        self
    }

    pub fn with_scid_length(mut self, len: usize) -> Self {
        self.scid_length = Some(len);
        self
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Effective method parameters as of a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// Method and version, e.g. `did:tdw:1`.
    pub method: String,
    /// Self-certifying identifier fixed at genesis.
    pub scid: String,
    /// Multikeys authorized to sign the next version.
    pub update_keys: Vec<String>,
    /// Pre-rotation commitments to the next update keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_key_hashes: Option<Vec<String>>,
    /// Whether pre-rotation is mandatory from here on.
    pub prerotation: bool,
    pub hash: HashAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scid_length: Option<usize>,
    pub deactivated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Params {
    /// Build the effective parameters of version 1 from its recorded update.
    ///
    /// # Errors
    ///
    /// `InvalidParams` when `method` or `scid` is missing or wrong, when
    /// `updateKeys` is empty, or when a value is out of range;
    /// `UnsupportedAlgorithm` for an unknown `hash`.
    pub fn genesis(update: &ParamsUpdate, config: &MethodConfig) -> Result<Self, TdwError> {
        let expected_method = config.method_param();
        let method = update
            .method
            .clone()
            .ok_or_else(|| TdwError::InvalidParams("genesis must set 'method'".into()))?;
        if method != expected_method {
            return Err(TdwError::InvalidParams(format!(
                "unsupported method {method:?}, expected {expected_method:?}"
            )));
        }
        let scid = update
            .scid
            .clone()
            .ok_or_else(|| TdwError::InvalidParams("genesis must set 'scid'".into()))?;
        let update_keys = update.update_keys.clone().unwrap_or_default();
        if update_keys.is_empty() {
            return Err(TdwError::InvalidParams(
                "genesis must set at least one update key".into(),
            ));
        }
        let hash = match update.hash.as_deref() {
            Some(name) => name.parse()?,
            None => config.default_hash,
        };
        if let Some(len) = update.scid_length {
            check_scid_length(len, hash)?;
        }
        let params = Self {
            method,
            scid,
            update_keys,
            next_key_hashes: update.next_key_hashes.clone(),
            prerotation: update.prerotation.unwrap_or(false),
            hash,
            scid_length: update.scid_length,
            deactivated: update.deactivated.unwrap_or(false),
            ttl: update.ttl,
            extra: update.extra.clone(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Apply a later version's update, producing the new effective set.
    ///
    /// # Errors
    ///
    /// `InvalidParams` for any attempt to change an immutable value, to turn
    /// pre-rotation off, or to reactivate a deactivated DID.
    pub fn apply(&self, update: &ParamsUpdate) -> Result<Self, TdwError> {
        if let Some(method) = &update.method {
            if *method != self.method {
                return Err(TdwError::InvalidParams(
                    "cannot override 'method' parameter".into(),
                ));
            }
        }
        if let Some(scid) = &update.scid {
            if *scid != self.scid {
                return Err(TdwError::InvalidParams("'scid' cannot change".into()));
            }
        }
        if let Some(name) = &update.hash {
            let hash: HashAlgorithm = name.parse()?;
            if hash != self.hash {
                return Err(TdwError::InvalidParams("'hash' cannot change".into()));
            }
        }
        if update.scid_length.is_some() && update.scid_length != self.scid_length {
            return Err(TdwError::InvalidParams("'scidLength' cannot change".into()));
        }
        if self.prerotation && update.prerotation == Some(false) {
            return Err(TdwError::InvalidParams(
                "'prerotation' cannot be disabled once enabled".into(),
            ));
        }
        if self.deactivated && update.deactivated == Some(false) {
            return Err(TdwError::InvalidParams(
                "a deactivated DID cannot be reactivated".into(),
            ));
        }

        let mut next = self.clone();
        if let Some(keys) = &update.update_keys {
            next.update_keys = keys.clone();
        }
        if let Some(hashes) = &update.next_key_hashes {
            next.next_key_hashes = Some(hashes.clone());
        }
        if let Some(on) = update.prerotation {
            next.prerotation = on;
        }
        if let Some(deactivated) = update.deactivated {
            next.deactivated = deactivated;
        }
        if let Some(ttl) = update.ttl {
            next.ttl = Some(ttl);
        }
        for (key, value) in &update.extra {
            next.extra.insert(key.clone(), value.clone());
        }
        next.validate()?;
        Ok(next)
    }

    /// Next-key commitments, empty when none are published.
    pub fn next_key_hashes(&self) -> &[String] {
        self.next_key_hashes.as_deref().unwrap_or(&[])
    }

    /// Whether new update keys must match a prior commitment.
    pub fn requires_prerotation(&self) -> bool {
        !self.next_key_hashes().is_empty()
    }

    fn validate(&self) -> Result<(), TdwError> {
        if !self.deactivated && self.update_keys.is_empty() {
            return Err(TdwError::InvalidParams(
                "'updateKeys' must not be empty".into(),
            ));
        }
        if self.prerotation && !self.deactivated && self.next_key_hashes().is_empty() {
            return Err(TdwError::InvalidParams(
                "'nextKeyHashes' is required while prerotation is enabled".into(),
            ));
        }
        for h in self.next_key_hashes() {
            check_key_hash_format(h, self.hash)?;
        }
        Ok(())
    }
}

/// Check an SCID length against the bounds allowed for `hash`.
pub fn check_scid_length(len: usize, hash: HashAlgorithm) -> Result<(), TdwError> {
    if len < MIN_SCID_LENGTH || len > hash.encoded_len() {
        return Err(TdwError::InvalidParams(format!(
            "scidLength {len} outside {MIN_SCID_LENGTH}..={}",
            hash.encoded_len()
        )));
    }
    Ok(())
}

fn check_key_hash_format(h: &str, hash: HashAlgorithm) -> Result<(), TdwError> {
    let well_formed = h.len() == hash.encoded_len()
        && h.chars().all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c));
    if !well_formed {
        return Err(TdwError::InvalidParams(format!(
            "malformed next key hash {h:?}"
        )));
    }
    Ok(())
}
