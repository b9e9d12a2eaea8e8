//! # History Log I/O
//!
//! The history of a DID is a JSON Lines file: one [`HistoryEntry`] per line,
//! oldest first. Entries are only ever appended. Next to the log sits the
//! latest resolved document, rewritten after every append.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tdw_core::{MethodConfig, TdwDid, TdwError};
use tdw_crypto::DataIntegrityProof;

use crate::history::{HistoryMetadata, HistoryVerifier, VerifyOptions};
use crate::state::DocumentState;

/// One persisted version record.
///
/// `parameters` and `state` stay raw JSON: the verifier hashes exactly what
/// was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HistoryEntry {
    pub version_id: String,
    pub version_time: String,
    pub parameters: Value,
    pub state: Value,
    pub proof: Vec<DataIntegrityProof>,
}

impl HistoryEntry {
    /// The version number declared in `versionId`, if it is well formed.
    pub fn version_number(&self) -> Option<u64> {
        split_version_id(&self.version_id).map(|(n, _)| n)
    }

    /// Serialize as a single log line, without the trailing newline.
    pub fn to_line(&self) -> Result<String, TdwError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Split `"<n>-<hash>"` into its number and hash.
pub fn split_version_id(version_id: &str) -> Option<(u64, &str)> {
    let (number, hash) = version_id.split_once('-')?;
    let number: u64 = number.parse().ok()?;
    if number == 0 || hash.is_empty() {
        return None;
    }
    Some((number, hash))
}

/// Parse every non-blank line of a history log.
///
/// # Errors
///
/// `ChainBroken` at the 1-based entry position of the first line that is not
/// a valid entry. I/O failures are returned as `Io`.
pub fn read_history(reader: impl BufRead) -> Result<Vec<HistoryEntry>, TdwError> {
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let position = entries.len() as u64 + 1;
        let entry: HistoryEntry =
            serde_json::from_str(&line).map_err(|e| TdwError::from(e).broken_at(position))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// The directory holding the log of `did` under `base`, named by the DID's
/// method-specific identifier.
pub fn history_dir(did: &str, base: &Path, config: &MethodConfig) -> Result<PathBuf, TdwError> {
    let parsed = TdwDid::parse(did, config)?;
    Ok(base.join(parsed.method_specific_id()))
}

/// Append `state` to the log in `dir` and rewrite the document file.
///
/// # Errors
///
/// `InvalidParams` when `state` is not the version directly after the last
/// one in the log (version 1 for a missing or empty log), or when it chains
/// onto a different predecessor than that last entry.
pub fn write_document_state(
    dir: &Path,
    state: &DocumentState,
    config: &MethodConfig,
) -> Result<(), TdwError> {
    let log_path = dir.join(&config.history_filename);
    let last = last_entry(&log_path)?;
    let last_number = match &last {
        None => 0,
        Some(entry) => entry.version_number().ok_or_else(|| {
            TdwError::InvalidParams(format!(
                "last entry of {} has malformed versionId {:?}",
                log_path.display(),
                entry.version_id
            ))
        })?,
    };
    if state.version_number() != last_number + 1 {
        return Err(TdwError::InvalidParams(format!(
            "cannot append version {} after version {last_number} in {}",
            state.version_number(),
            log_path.display()
        )));
    }
    if let Some(entry) = &last {
        if state.predecessor() != entry.version_id {
            return Err(TdwError::InvalidParams(format!(
                "version {} chains onto {:?}, but the log ends at {:?}",
                state.version_number(),
                state.predecessor(),
                entry.version_id
            )));
        }
    }

    let mut line = state.history_entry()?.to_line()?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    file.write_all(line.as_bytes())?;
    file.sync_all()?;

    let document = serde_json::to_string_pretty(state.document())?;
    fs::write(dir.join(&config.document_filename), document)?;
    tracing::info!(
        did = %state.document_id(),
        version_id = state.version_number(),
        path = %log_path.display(),
        "appended version to history"
    );
    Ok(())
}

/// Read and verify the log at `path`.
///
/// Lines are parsed only as the verifier reaches them, so a break is reported
/// at the first failing version and nothing past the resolved version is read.
pub fn load_history_path(
    path: &Path,
    options: VerifyOptions,
    config: &MethodConfig,
) -> Result<(DocumentState, HistoryMetadata), TdwError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut verifier = HistoryVerifier::new(options, config.clone());
    let mut consumed = 0usize;
    for line in reader.lines() {
        if verifier.is_settled() {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        consumed += 1;
        match serde_json::from_str::<HistoryEntry>(&line) {
            Ok(entry) => verifier.push(entry),
            Err(e) => verifier.reject(e.into()),
        };
    }
    tracing::debug!(path = %path.display(), entries = consumed, "loaded history");
    verifier.finish()
}

fn last_entry(log_path: &Path) -> Result<Option<HistoryEntry>, TdwError> {
    if !log_path.exists() {
        return Ok(None);
    }
    let entries = read_history(BufReader::new(fs::File::open(log_path)?))?;
    Ok(entries.into_iter().last())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tdw_core::{DidDocument, ParamsUpdate, Timestamp};
    use tdw_crypto::{Ed25519KeyPair, InMemorySigner, Signer};

    fn chain(n: usize) -> (InMemorySigner, Vec<DocumentState>) {
        let signer = InMemorySigner::new(Ed25519KeyPair::from_seed(&[4; 32]));
        let doc = DidDocument::new("did:tdw:example.com:{SCID}");
        let params = ParamsUpdate::new().with_update_keys(vec![signer.multikey().into()]);
        let t0 = Timestamp::parse("2024-03-01T00:00:00Z").unwrap();
        let mut states = vec![DocumentState::initial(doc, params, Some(t0), None, &MethodConfig::default())
            .unwrap()
            .sign(&signer)
            .unwrap()];
        for i in 1..n {
            let prior = states.last().unwrap();
            let doc = prior.document_copy().with_extra("seq", json!(i));
            let next = prior.next(doc, None, None).unwrap().sign(&signer).unwrap();
            states.push(next);
        }
        (signer, states)
    }

    #[test]
    fn split_version_id_forms() {
        assert_eq!(split_version_id("3-abc"), Some((3, "abc")));
        assert_eq!(split_version_id("0-abc"), None);
        assert_eq!(split_version_id("x-abc"), None);
        assert_eq!(split_version_id("3-"), None);
        assert_eq!(split_version_id("3"), None);
    }

    #[test]
    fn read_skips_blank_lines() {
        let (_, states) = chain(2);
        let text = format!(
            "{}\n\n{}\n",
            states[0].history_entry().unwrap().to_line().unwrap(),
            states[1].history_entry().unwrap().to_line().unwrap()
        );
        let entries = read_history(text.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].version_number(), Some(2));
    }

    #[test]
    fn malformed_line_breaks_at_its_position() {
        let (_, states) = chain(1);
        let text = format!(
            "{}\n{{\"versionId\": 2}}\n",
            states[0].history_entry().unwrap().to_line().unwrap()
        );
        match read_history(text.as_bytes()) {
            Err(TdwError::ChainBroken { at_version, .. }) => assert_eq!(at_version, 2),
            other => panic!("expected ChainBroken, got {other:?}"),
        }
    }

    #[test]
    fn unknown_entry_member_is_rejected() {
        let (_, states) = chain(1);
        let mut value = serde_json::to_value(states[0].history_entry().unwrap()).unwrap();
        value["extra"] = json!(true);
        assert!(read_history(value.to_string().as_bytes()).is_err());
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = MethodConfig::default();
        let (_, states) = chain(3);
        for state in &states {
            write_document_state(dir.path(), state, &config).unwrap();
        }
        let (loaded, meta) = load_history_path(
            &dir.path().join(&config.history_filename),
            VerifyOptions::default(),
            &config,
        )
        .unwrap();
        assert_eq!(loaded, states[2]);
        assert_eq!(meta.version_id, 3);

        let written: DidDocument = serde_json::from_str(
            &fs::read_to_string(dir.path().join(&config.document_filename)).unwrap(),
        )
        .unwrap();
        assert_eq!(&written, states[2].document());
    }

    #[test]
    fn write_rejects_gaps_and_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let config = MethodConfig::default();
        let (_, states) = chain(3);
        assert!(write_document_state(dir.path(), &states[1], &config).is_err());
        write_document_state(dir.path(), &states[0], &config).unwrap();
        assert!(write_document_state(dir.path(), &states[0], &config).is_err());
        assert!(write_document_state(dir.path(), &states[2], &config).is_err());
        write_document_state(dir.path(), &states[1], &config).unwrap();
    }

    #[test]
    fn write_rejects_version_from_another_chain() {
        let dir = tempfile::tempdir().unwrap();
        let config = MethodConfig::default();
        let (_, ours) = chain(1);
        let stranger = InMemorySigner::new(Ed25519KeyPair::from_seed(&[5; 32]));
        let theirs = DocumentState::initial(
            DidDocument::new("did:tdw:example.com:{SCID}"),
            ParamsUpdate::new().with_update_keys(vec![stranger.multikey().into()]),
            Some(Timestamp::parse("2024-03-01T00:00:00Z").unwrap()),
            None,
            &config,
        )
        .unwrap()
        .sign(&stranger)
        .unwrap();
        let foreign_v2 = theirs
            .next(theirs.document_copy(), None, None)
            .unwrap()
            .sign(&stranger)
            .unwrap();

        write_document_state(dir.path(), &ours[0], &config).unwrap();
        match write_document_state(dir.path(), &foreign_v2, &config) {
            Err(TdwError::InvalidParams(msg)) => assert!(msg.contains("chains onto")),
            other => panic!("expected InvalidParams, got {other:?}"),
        }
    }

    #[test]
    fn load_reports_first_bad_version_before_unreadable_tail() {
        let dir = tempfile::tempdir().unwrap();
        let config = MethodConfig::default();
        let (_, states) = chain(3);
        let mut lines: Vec<String> = states
            .iter()
            .map(|s| s.history_entry().unwrap().to_line().unwrap())
            .collect();
        let mut v2: Value = serde_json::from_str(&lines[1]).unwrap();
        v2["state"]["seq"] = json!(42);
        lines[1] = v2.to_string();
        lines.push("{not json".into());
        let path = dir.path().join(&config.history_filename);
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        match load_history_path(&path, VerifyOptions::default(), &config) {
            Err(TdwError::ChainBroken { at_version, reason }) => {
                assert_eq!(at_version, 2);
                assert!(matches!(*reason, TdwError::IdentifierMismatch { .. }));
            }
            other => panic!("expected ChainBroken, got {other:?}"),
        }

        let options = VerifyOptions {
            version_id: Some(1),
            ..VerifyOptions::default()
        };
        let (state, meta) = load_history_path(&path, options, &config).unwrap();
        assert_eq!(state, states[0]);
        assert_eq!(meta.version_id, 1);
    }

    #[test]
    fn load_reports_unreadable_line_at_its_position() {
        let dir = tempfile::tempdir().unwrap();
        let config = MethodConfig::default();
        let (_, states) = chain(2);
        let path = dir.path().join(&config.history_filename);
        let text = format!(
            "{}\n{{not json\n{}\n",
            states[0].history_entry().unwrap().to_line().unwrap(),
            states[1].history_entry().unwrap().to_line().unwrap()
        );
        fs::write(&path, text).unwrap();
        match load_history_path(&path, VerifyOptions::default(), &config) {
            Err(TdwError::ChainBroken { at_version, .. }) => assert_eq!(at_version, 2),
            other => panic!("expected ChainBroken, got {other:?}"),
        }
    }

    #[test]
    fn history_dir_uses_method_specific_id() {
        let config = MethodConfig::default();
        let dir = history_dir("did:tdw:example.com:users:abcdefghijklmnop", Path::new("/base"), &config)
            .unwrap();
        assert_eq!(dir, Path::new("/base/example.com:users:abcdefghijklmnop"));
        assert!(history_dir("did:web:example.com", Path::new("/base"), &config).is_err());
    }
}
