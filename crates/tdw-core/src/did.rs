//! # DID Syntax
//!
//! A did:tdw identifier has the form `did:tdw:<domain>[:<path>...]:<scid>`.
//! The domain is a DNS name, optionally with a percent-encoded port
//! (`example.com%3A8080`); path segments locate the history below the
//! domain root; the final segment is the self-certifying identifier.

use std::fmt;

use crate::config::MethodConfig;
use crate::error::TdwError;

/// A parsed did:tdw identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TdwDid {
    method: String,
    domain: String,
    path: Vec<String>,
    scid: String,
}

impl TdwDid {
    /// Parse a DID string.
    ///
    /// # Errors
    ///
    /// `InvalidGenesisFormat` if the prefix, domain, or segments are malformed.
    pub fn parse(did: &str, config: &MethodConfig) -> Result<Self, TdwError> {
        let prefix = config.did_prefix();
        let msid = did.strip_prefix(&prefix).ok_or_else(|| {
            TdwError::InvalidGenesisFormat(format!("{did:?} does not start with {prefix:?}"))
        })?;
        let segments: Vec<&str> = msid.split(':').collect();
        if segments.len() < 2 {
            return Err(TdwError::InvalidGenesisFormat(format!(
                "{did:?} needs a domain and an SCID segment"
            )));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TdwError::InvalidGenesisFormat(format!(
                "{did:?} has an empty segment"
            )));
        }
        let domain = segments[0];
        if !is_valid_domain(domain) {
            return Err(TdwError::InvalidGenesisFormat(format!(
                "invalid domain {domain:?}"
            )));
        }
        let scid = segments[segments.len() - 1];
        let path = segments[1..segments.len() - 1]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Ok(Self {
            method: config.method_name.clone(),
            domain: domain.to_string(),
            path,
            scid: scid.to_string(),
        })
    }

    /// The domain segment, port encoding included.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Path segments between the domain and the SCID.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The final (SCID) segment.
    pub fn scid(&self) -> &str {
        &self.scid
    }

    /// Everything after `did:<method>:`.
    pub fn method_specific_id(&self) -> String {
        let mut parts = Vec::with_capacity(self.path.len() + 2);
        parts.push(self.domain.as_str());
        parts.extend(self.path.iter().map(String::as_str));
        parts.push(self.scid.as_str());
        parts.join(":")
    }
}

impl fmt::Display for TdwDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.method_specific_id())
    }
}

/// Check that `did` is well formed and ends in `scid`.
///
/// # Errors
///
/// `InvalidGenesisFormat` for syntax problems, `IdentifierMismatch` when
/// the final segment is not `scid`.
pub fn check_document_id_format(
    did: &str,
    scid: &str,
    config: &MethodConfig,
) -> Result<TdwDid, TdwError> {
    let parsed = TdwDid::parse(did, config)?;
    if parsed.scid() != scid {
        return Err(TdwError::IdentifierMismatch {
            expected: scid.to_string(),
            found: parsed.scid().to_string(),
        });
    }
    Ok(parsed)
}

/// Whether `domain` is an acceptable host name.
///
/// Equivalent to `^([a-zA-Z0-9%_\-]+\.)+[a-zA-Z0-9%_\.\-]{2,}$`: at least one
/// non-empty label followed by a dot, then two or more further characters.
pub fn is_valid_domain(domain: &str) -> bool {
    if !domain.chars().all(is_domain_char) {
        return false;
    }
    match domain.find('.') {
        Some(first_dot) if first_dot > 0 => domain.len() - first_dot - 1 >= 2,
        _ => false,
    }
}

fn is_domain_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '%' | '_' | '-' | '.')
}
