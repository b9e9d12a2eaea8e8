//! # Encrypted Key Store
//!
//! A single JSON file holding the private keys of one DID. Each key's 32-byte
//! seed is sealed with ChaCha20-Poly1305 under a key derived from the pass
//! key; the key id is bound in as associated data, so a sealed seed cannot be
//! moved to another entry. Public material (kid, multikey, tags) stays in
//! clear text, which lets a caller find a key by tag without unsealing
//! anything.
//!
//! ## Lifecycle
//!
//! `provision` creates a new file and fails if one exists; `open` checks the
//! pass key against a sealed check value before returning. All access goes
//! through a [`KeySession`], which holds the store lock for its lifetime, so
//! sessions on one handle never interleave. Every mutation rewrites the file
//! atomically (temporary file, then rename).
//!
//! Seeds are unsealed only while signing and are wiped on drop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use parking_lot::{Mutex, MutexGuard};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::ed25519::{Ed25519KeyPair, Ed25519Signature, KeyAlgorithm, SigningPayload};
use crate::error::CryptoError;
use crate::signer::Signer;

const STORE_FORMAT_VERSION: u32 = 1;
const KDF_NAME: &str = "sha256-iterated";
const KDF_ITERATIONS: u32 = 100_000;
const CHECK_PLAINTEXT: &[u8] = b"tdw key store check value";
const CHECK_AAD: &[u8] = b"check";

// ---------------------------------------------------------------------------
// On-disk format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    store_id: uuid::Uuid,
    kdf: KdfParams,
    check: Sealed,
    keys: Vec<KeyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KdfParams {
    algorithm: String,
    iterations: u32,
    salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sealed {
    nonce: String,
    ciphertext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyEntry {
    kid: String,
    algorithm: String,
    multikey: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    seed: Sealed,
}

/// Public description of a stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    pub kid: String,
    pub algorithm: KeyAlgorithm,
    pub multikey: String,
    pub tags: BTreeMap<String, String>,
}

struct StoreState {
    path: PathBuf,
    file: StoreFile,
    key: Zeroizing<[u8; 32]>,
    closed: bool,
}

// ---------------------------------------------------------------------------
// KeyStore
// ---------------------------------------------------------------------------

/// Handle to an opened key store.
pub struct KeyStore {
    state: Arc<Mutex<StoreState>>,
}

impl KeyStore {
    /// Create a new, empty store at `path`.
    ///
    /// # Errors
    ///
    /// `KeyStore` if a file already exists at `path`.
    pub fn provision(path: &Path, pass_key: &str) -> Result<Self, CryptoError> {
        if path.exists() {
            return Err(CryptoError::KeyStore(format!(
                "key store already exists at {}",
                path.display()
            )));
        }
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let kdf = KdfParams {
            algorithm: KDF_NAME.to_string(),
            iterations: KDF_ITERATIONS,
            salt: encode_bytes(&salt),
        };
        let key = derive_store_key(pass_key, &salt, KDF_ITERATIONS);
        let check = seal(&key, CHECK_PLAINTEXT, CHECK_AAD)?;
        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            store_id: uuid::Uuid::new_v4(),
            kdf,
            check,
            keys: Vec::new(),
        };
        write_atomic(path, &file)?;
        tracing::info!(path = %path.display(), store_id = %file.store_id, "provisioned key store");
        Ok(Self::from_state(StoreState {
            path: path.to_path_buf(),
            file,
            key,
            closed: false,
        }))
    }

    /// Open an existing store.
    ///
    /// # Errors
    ///
    /// `KeyStore` if the file is missing or malformed, if its KDF is weaker
    /// than the one `provision` writes, or if the pass key is wrong.
    pub fn open(path: &Path, pass_key: &str) -> Result<Self, CryptoError> {
        let content = std::fs::read(path).map_err(|e| {
            CryptoError::KeyStore(format!("cannot read key store {}: {e}", path.display()))
        })?;
        let file: StoreFile = serde_json::from_slice(&content)?;
        if file.version != STORE_FORMAT_VERSION || file.kdf.algorithm != KDF_NAME {
            return Err(CryptoError::KeyStore(format!(
                "unsupported key store format (version {}, kdf {})",
                file.version, file.kdf.algorithm
            )));
        }
        if file.kdf.iterations < KDF_ITERATIONS {
            return Err(CryptoError::KeyStore(format!(
                "key store KDF iterations {} below minimum {KDF_ITERATIONS}",
                file.kdf.iterations
            )));
        }
        let salt = decode_bytes(&file.kdf.salt)?;
        let key = derive_store_key(pass_key, &salt, file.kdf.iterations);
        let check = unseal(&key, &file.check, CHECK_AAD)
            .map_err(|_| CryptoError::KeyStore("incorrect pass key".into()))?;
        if !bool::from(check.as_slice().ct_eq(CHECK_PLAINTEXT)) {
            return Err(CryptoError::KeyStore("incorrect pass key".into()));
        }
        tracing::info!(path = %path.display(), keys = file.keys.len(), "opened key store");
        Ok(Self::from_state(StoreState {
            path: path.to_path_buf(),
            file,
            key,
            closed: false,
        }))
    }

    fn from_state(state: StoreState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Start a session. Blocks while another session on this handle is live.
    pub fn session(&self) -> Result<KeySession<'_>, CryptoError> {
        let guard = self.state.lock();
        if guard.closed {
            return Err(CryptoError::KeyStore("key store is closed".into()));
        }
        Ok(KeySession {
            guard,
            shared: &self.state,
        })
    }

    /// Close the store. Signers obtained from it stop working.
    pub fn close(self) -> Result<(), CryptoError> {
        let mut state = self.state.lock();
        state.closed = true;
        tracing::debug!(path = %state.path.display(), "closed key store");
        Ok(())
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("KeyStore")
            .field("path", &state.path)
            .field("keys", &state.file.keys.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// KeySession
// ---------------------------------------------------------------------------

/// Exclusive access to an opened store.
pub struct KeySession<'a> {
    guard: MutexGuard<'a, StoreState>,
    shared: &'a Arc<Mutex<StoreState>>,
}

impl KeySession<'_> {
    /// Seal and persist a key under `kid`.
    ///
    /// # Errors
    ///
    /// `KeyStore` if `kid` is already present. If the file cannot be written
    /// the store is left as it was.
    pub fn insert_key(
        &mut self,
        kid: &str,
        keypair: &Ed25519KeyPair,
        tags: BTreeMap<String, String>,
    ) -> Result<(), CryptoError> {
        if self.guard.file.keys.iter().any(|k| k.kid == kid) {
            return Err(CryptoError::KeyStore(format!("duplicate key id {kid:?}")));
        }
        let seed = keypair.seed();
        let sealed = seal(&self.guard.key, seed.as_slice(), kid.as_bytes())?;
        // Only the persisted file becomes the in-memory state.
        let mut updated = self.guard.file.clone();
        updated.keys.push(KeyEntry {
            kid: kid.to_string(),
            algorithm: KeyAlgorithm::Ed25519.as_str().to_string(),
            multikey: keypair.public_key().to_multikey(),
            tags,
            seed: sealed,
        });
        write_atomic(&self.guard.path, &updated)?;
        self.guard.file = updated;
        tracing::debug!(kid, "inserted key");
        Ok(())
    }

    /// Public description of the key stored under `kid`.
    pub fn fetch_key(&self, kid: &str) -> Result<Option<StoredKey>, CryptoError> {
        self.guard
            .file
            .keys
            .iter()
            .find(|k| k.kid == kid)
            .map(describe)
            .transpose()
    }

    /// Keys carrying tag `name` with `value`.
    pub fn find_by_tag(&self, name: &str, value: &str) -> Result<Vec<StoredKey>, CryptoError> {
        self.guard
            .file
            .keys
            .iter()
            .filter(|k| k.tags.get(name).is_some_and(|v| v == value))
            .map(describe)
            .collect()
    }

    /// All key ids, in insertion order.
    pub fn list_kids(&self) -> Vec<String> {
        self.guard.file.keys.iter().map(|k| k.kid.clone()).collect()
    }

    /// A signer for the key stored under `kid`.
    ///
    /// The seed is checked to unseal now, and unsealed again for each
    /// signature.
    pub fn signer(&self, kid: &str) -> Result<StoreSigner, CryptoError> {
        let entry = find_entry(&self.guard, kid)?;
        let stored = describe(entry)?;
        let keypair = unseal_keypair(&self.guard.key, entry)?;
        if keypair.public_key().to_multikey() != stored.multikey {
            return Err(CryptoError::KeyStore(format!(
                "stored public key for {kid:?} does not match its seed"
            )));
        }
        Ok(StoreSigner {
            kid: stored.kid,
            multikey: stored.multikey,
            algorithm: stored.algorithm,
            store: Arc::clone(self.shared),
        })
    }
}

// ---------------------------------------------------------------------------
// StoreSigner
// ---------------------------------------------------------------------------

/// A signer backed by the key store.
///
/// Signing takes the store lock, so it waits for any live [`KeySession`] on
/// the same handle to be dropped.
pub struct StoreSigner {
    kid: String,
    multikey: String,
    algorithm: KeyAlgorithm,
    store: Arc<Mutex<StoreState>>,
}

impl Signer for StoreSigner {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn multikey(&self) -> &str {
        &self.multikey
    }

    fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    fn sign(&self, payload: &SigningPayload) -> Result<Ed25519Signature, CryptoError> {
        let state = self.store.lock();
        if state.closed {
            return Err(CryptoError::KeyStore("key store is closed".into()));
        }
        let entry = find_entry(&state, &self.kid)?;
        let keypair = unseal_keypair(&state.key, entry)?;
        tracing::debug!(kid = %self.kid, "signing with stored key");
        Ok(keypair.sign(payload))
    }
}

impl std::fmt::Debug for StoreSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSigner")
            .field("kid", &self.kid)
            .field("multikey", &self.multikey)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn find_entry<'s>(state: &'s StoreState, kid: &str) -> Result<&'s KeyEntry, CryptoError> {
    state
        .file
        .keys
        .iter()
        .find(|k| k.kid == kid)
        .ok_or_else(|| CryptoError::KeyStore(format!("no key with id {kid:?}")))
}

fn describe(entry: &KeyEntry) -> Result<StoredKey, CryptoError> {
    Ok(StoredKey {
        kid: entry.kid.clone(),
        algorithm: entry.algorithm.parse()?,
        multikey: entry.multikey.clone(),
        tags: entry.tags.clone(),
    })
}

fn unseal_keypair(key: &[u8; 32], entry: &KeyEntry) -> Result<Ed25519KeyPair, CryptoError> {
    let plain = Zeroizing::new(unseal(key, &entry.seed, entry.kid.as_bytes())?);
    let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
        plain
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KeyStore(format!("corrupt seed for {:?}", entry.kid)))?,
    );
    Ok(Ed25519KeyPair::from_seed(&seed))
}

/// Iterated SHA-256 over the salt and pass key.
fn derive_store_key(pass_key: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut state = Zeroizing::new([0u8; 32]);
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(pass_key.as_bytes());
    state.copy_from_slice(&hasher.finalize());
    for _ in 0..iterations {
        let mut hasher = Sha256::new();
        hasher.update(state.as_slice());
        hasher.update(salt);
        state.copy_from_slice(&hasher.finalize());
    }
    state
}

fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Sealed, CryptoError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(Sealed {
        nonce: encode_bytes(&nonce),
        ciphertext: encode_bytes(&ciphertext),
    })
}

fn unseal(key: &[u8; 32], sealed: &Sealed, aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let nonce = decode_bytes(&sealed.nonce)?;
    if nonce.len() != 12 {
        return Err(CryptoError::Encryption("nonce must be 12 bytes".into()));
    }
    let ciphertext = decode_bytes(&sealed.ciphertext)?;
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

fn encode_bytes(bytes: &[u8]) -> String {
    multibase::Base::Base64Url.encode(bytes)
}

fn decode_bytes(s: &str) -> Result<Vec<u8>, CryptoError> {
    multibase::Base::Base64Url
        .decode(s)
        .map_err(|e| CryptoError::Encoding(format!("key store field: {e}")))
}

fn write_atomic(path: &Path, file: &StoreFile) -> Result<(), CryptoError> {
    let bytes = serde_json::to_vec_pretty(file)?;
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::verify;
    use crate::Ed25519PublicKey;
    use tdw_core::CanonicalBytes;

    fn payload() -> SigningPayload {
        SigningPayload::from_canonical(&CanonicalBytes::new(&serde_json::json!({"n": 1})).unwrap())
    }

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn provision_insert_reopen_sign() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let kp = Ed25519KeyPair::generate();
        let mk = kp.public_key().to_multikey();

        let store = KeyStore::provision(&path, "secret").unwrap();
        store
            .session()
            .unwrap()
            .insert_key("did:example:a#k1", &kp, BTreeMap::new())
            .unwrap();
        store.close().unwrap();

        let store = KeyStore::open(&path, "secret").unwrap();
        let session = store.session().unwrap();
        assert_eq!(session.list_kids(), vec!["did:example:a#k1".to_string()]);
        let stored = session.fetch_key("did:example:a#k1").unwrap().unwrap();
        assert_eq!(stored.multikey, mk);
        let signer = session.signer("did:example:a#k1").unwrap();
        drop(session);
        let sig = signer.sign(&payload()).unwrap();
        verify(&payload(), &sig, &Ed25519PublicKey::from_multikey(&mk).unwrap()).unwrap();
        assert_eq!(signer.multikey(), mk);
    }

    #[test]
    fn provision_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        KeyStore::provision(&path, "pw").unwrap();
        assert!(matches!(
            KeyStore::provision(&path, "pw"),
            Err(CryptoError::KeyStore(_))
        ));
    }

    #[test]
    fn wrong_pass_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        KeyStore::provision(&path, "right").unwrap();
        match KeyStore::open(&path, "wrong") {
            Err(CryptoError::KeyStore(msg)) => assert!(msg.contains("pass key")),
            other => panic!("expected KeyStore error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_kid_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::provision(&dir.path().join("keys.json"), "pw").unwrap();
        let mut session = store.session().unwrap();
        session
            .insert_key("k", &Ed25519KeyPair::generate(), BTreeMap::new())
            .unwrap();
        assert!(session
            .insert_key("k", &Ed25519KeyPair::generate(), BTreeMap::new())
            .is_err());
    }

    #[test]
    fn find_by_tag() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::provision(&dir.path().join("keys.json"), "pw").unwrap();
        let mut session = store.session().unwrap();
        session
            .insert_key("a", &Ed25519KeyPair::generate(), tags(&[("hash", "abc")]))
            .unwrap();
        session
            .insert_key("b", &Ed25519KeyPair::generate(), tags(&[("hash", "def")]))
            .unwrap();
        let found = session.find_by_tag("hash", "def").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kid, "b");
        assert!(session.find_by_tag("hash", "zzz").unwrap().is_empty());
        assert!(session.fetch_key("missing").unwrap().is_none());
    }

    #[test]
    fn seeds_are_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let kp = Ed25519KeyPair::from_seed(&[0x5a; 32]);
        let store = KeyStore::provision(&path, "pw").unwrap();
        store
            .session()
            .unwrap()
            .insert_key("k", &kp, BTreeMap::new())
            .unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains(&encode_bytes(&[0x5a; 32])));
        assert!(raw.contains(&kp.public_key().to_multikey()));
    }

    #[test]
    fn moved_seed_fails_to_unseal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let store = KeyStore::provision(&path, "pw").unwrap();
        {
            let mut session = store.session().unwrap();
            session.insert_key("a", &Ed25519KeyPair::generate(), BTreeMap::new()).unwrap();
            session.insert_key("b", &Ed25519KeyPair::generate(), BTreeMap::new()).unwrap();
        }
        store.close().unwrap();

        let mut file: StoreFile =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let seed_a = file.keys[0].seed.clone();
        file.keys[1].seed = seed_a;
        write_atomic(&path, &file).unwrap();

        let store = KeyStore::open(&path, "pw").unwrap();
        assert!(store.session().unwrap().signer("b").is_err());
    }

    #[test]
    fn closed_store_stops_signing() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::provision(&dir.path().join("keys.json"), "pw").unwrap();
        let signer = {
            let mut session = store.session().unwrap();
            session.insert_key("k", &Ed25519KeyPair::generate(), BTreeMap::new()).unwrap();
            session.signer("k").unwrap()
        };
        assert!(signer.sign(&payload()).is_ok());
        store.close().unwrap();
        assert!(signer.sign(&payload()).is_err());
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let store = KeyStore::provision(&path, "pw").unwrap();

        // A non-empty directory in place of the file makes the rename fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), b"x").unwrap();

        let kp = Ed25519KeyPair::generate();
        {
            let mut session = store.session().unwrap();
            assert!(session.insert_key("k1", &kp, BTreeMap::new()).is_err());
            assert!(session.list_kids().is_empty());
            assert!(session.signer("k1").is_err());
        }

        std::fs::remove_dir_all(&path).unwrap();
        let mut session = store.session().unwrap();
        session.insert_key("k1", &kp, BTreeMap::new()).unwrap();
        assert_eq!(session.list_kids(), vec!["k1".to_string()]);
    }

    #[test]
    fn weakened_kdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        KeyStore::provision(&path, "pw").unwrap().close().unwrap();

        let mut file: StoreFile =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        file.kdf.iterations = 0;
        write_atomic(&path, &file).unwrap();

        match KeyStore::open(&path, "pw") {
            Err(CryptoError::KeyStore(msg)) => assert!(msg.contains("iterations")),
            other => panic!("expected KeyStore error, got {other:?}"),
        }
    }

    #[test]
    fn kdf_depends_on_salt_and_pass() {
        let a = derive_store_key("pw", b"salt-one-16bytes", 10);
        let b = derive_store_key("pw", b"salt-two-16bytes", 10);
        let c = derive_store_key("px", b"salt-one-16bytes", 10);
        assert_ne!(*a, *b);
        assert_ne!(*a, *c);
        assert_eq!(*a, *derive_store_key("pw", b"salt-one-16bytes", 10));
    }
}
