//! File-backed key store for environments without secure hardware.
//!
//! Each key pair is stored in its own file under `<root>/sealkit/keys/`. The
//! private scalar is sealed with XChaCha20-Poly1305 under a caller-provided
//! [`VaultKey`]; the public key is kept in the clear so lookups for encryption
//! do not need to open the private half.
//!
//! # Record Format
//!
//! CBOR-encoded [`KeyRecordEnvelope`] with the sealed private key laid out as:
//!
//! ```text
//! [nonce (24 bytes)][ciphertext + tag]
//! AAD = "sealkit:key-record" || tag
//! ```
//!
//! # Atomic Writes
//!
//! Records are written to a uniquely named temporary file, synced, then
//! hard-linked to their final name. Linking never replaces an existing file,
//! so when several stores (or processes) create the same tag concurrently
//! exactly one wins and the others fail with
//! [`SealKitError::KeyGenerationFailed`]. Readers see either no record or a
//! complete one.
//!
//! Private-key handles hold the sealed record and only open it when a key
//! agreement is requested.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use p256::{PublicKey, SecretKey};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::paths::KeyStorePaths;
use super::record::KeyRecordEnvelope;
use super::{KeyStore, PrivateKeyHandle, PublicKeyHandle};
use crate::ecies::{self, SharedSecret};
use crate::error::{SealKitError, SealResult};
use crate::presence::AuthContext;
use crate::tag::KeyTag;

/// Size of the XChaCha20 nonce in bytes.
const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
const TAG_SIZE: usize = 16;

const RECORD_AD_PREFIX: &[u8] = b"sealkit:key-record";

/// Key sealing the private halves stored by a [`FileKeyStore`] (256-bit).
///
/// Typically unwrapped from the platform keychain at startup.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; 32]);

impl VaultKey {
    /// Creates a vault key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generates a new random vault key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Software key store persisting encrypted key records on disk.
///
/// Never hardware-backed: `require_hardware` lookups find nothing and
/// `require_hardware` creation fails with
/// [`SealKitError::SecureHardwareUnavailable`].
#[derive(Debug)]
pub struct FileKeyStore {
    paths: KeyStorePaths,
    vault_key: VaultKey,
    /// Serializes record creation and deletion within the process.
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    /// Opens (creating directories if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`SealKitError::KeyStore`] if the key directory cannot be created.
    pub fn open(root: impl AsRef<Path>, vault_key: VaultKey) -> SealResult<Self> {
        let paths = KeyStorePaths::new(root);
        fs::create_dir_all(paths.keys_dir()).map_err(|err| {
            SealKitError::KeyStore(format!(
                "failed to create key directory '{}': {err}",
                paths.keys_dir().display()
            ))
        })?;
        Ok(Self {
            paths,
            vault_key,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the on-disk layout used by this store.
    #[must_use]
    pub const fn paths(&self) -> &KeyStorePaths {
        &self.paths
    }

    fn read_envelope(&self, tag: &KeyTag) -> SealResult<Option<KeyRecordEnvelope>> {
        let path = self.paths.key_path(tag);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(SealKitError::KeyStore(format!(
                    "failed to read key record '{}': {err}",
                    path.display()
                )))
            }
        };
        let envelope = KeyRecordEnvelope::deserialize(&bytes)?;
        if envelope.tag != tag.as_str() {
            return Err(SealKitError::KeyStore(
                "key record belongs to a different tag".to_string(),
            ));
        }
        Ok(Some(envelope))
    }

    fn seal_secret(&self, tag: &KeyTag, secret: &SecretKey) -> SealResult<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(self.vault_key.as_bytes().into());
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut raw = Zeroizing::new([0u8; 32]);
        raw.copy_from_slice(&secret.to_bytes());
        let ad = record_ad(tag);
        let sealed = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: raw.as_slice(),
                    aad: &ad,
                },
            )
            .map_err(|err| SealKitError::KeyGenerationFailed(format!("sealing failed: {err}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn publish(&self, tag: &KeyTag, data: &[u8]) -> SealResult<()> {
        let final_path = self.paths.key_path(tag);
        let mut unique = [0u8; 8];
        OsRng.fill_bytes(&mut unique);
        let temp_path = self.paths.temp_path(tag, &hex::encode(unique));

        let linked = write_synced(&temp_path, data)
            .and_then(|()| fs::hard_link(&temp_path, &final_path));
        let _ = fs::remove_file(&temp_path);

        match linked {
            Ok(()) => self.sync_directory().map_err(|err| {
                SealKitError::KeyGenerationFailed(format!("failed to sync key directory: {err}"))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(already_exists(tag))
            }
            Err(err) => Err(SealKitError::KeyGenerationFailed(format!(
                "failed to persist key record: {err}"
            ))),
        }
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> std::io::Result<()> {
        File::open(self.paths.keys_dir())?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn has_secure_hardware(&self) -> bool {
        false
    }

    fn find_public_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<PublicKeyHandle>> {
        if require_hardware {
            return Ok(None);
        }
        let Some(envelope) = self.read_envelope(tag)? else {
            return Ok(None);
        };
        let key = PublicKey::from_sec1_bytes(&envelope.public_key)
            .map_err(|_| SealKitError::KeyStore("stored public key is invalid".to_string()))?;
        Ok(Some(PublicKeyHandle::new(tag.clone(), false, key)))
    }

    fn find_private_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<Box<dyn PrivateKeyHandle>>> {
        if require_hardware {
            return Ok(None);
        }
        let Some(envelope) = self.read_envelope(tag)? else {
            return Ok(None);
        };
        Ok(Some(Box::new(FilePrivateKey {
            tag: tag.clone(),
            envelope,
            vault_key: self.vault_key.clone(),
        })))
    }

    fn create_key_pair(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
        _auth: &AuthContext,
    ) -> SealResult<PublicKeyHandle> {
        if require_hardware {
            return Err(SealKitError::SecureHardwareUnavailable);
        }

        let _guard = self.write_lock.lock().map_err(|_| {
            SealKitError::KeyGenerationFailed("keystore lock poisoned".to_string())
        })?;
        if self.paths.key_path(tag).exists() {
            return Err(already_exists(tag));
        }

        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        let envelope = KeyRecordEnvelope::new(
            tag.as_str().to_string(),
            ecies::encode_public_key(&public),
            self.seal_secret(tag, &secret)?,
            unix_now(),
        );
        let bytes = envelope.serialize()?;
        self.publish(tag, &bytes)?;

        log::debug!("created software key pair for tag '{tag}'");
        Ok(PublicKeyHandle::new(tag.clone(), false, public))
    }

    fn delete_all(&self, tag: &KeyTag, require_hardware: bool) -> SealResult<()> {
        if require_hardware {
            return Err(SealKitError::ItemNotFound);
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SealKitError::DeletionFailed("keystore lock poisoned".to_string()))?;
        let path = self.paths.key_path(tag);
        match fs::remove_file(&path) {
            Ok(()) => self.sync_directory().map_err(|err| {
                SealKitError::DeletionFailed(format!("failed to sync key directory: {err}"))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SealKitError::ItemNotFound)
            }
            Err(err) => Err(SealKitError::DeletionFailed(format!(
                "failed to delete key record '{}': {err}",
                path.display()
            ))),
        }
    }
}

struct FilePrivateKey {
    tag: KeyTag,
    envelope: KeyRecordEnvelope,
    vault_key: VaultKey,
}

impl PrivateKeyHandle for FilePrivateKey {
    fn tag(&self) -> &KeyTag {
        &self.tag
    }

    fn is_hardware_backed(&self) -> bool {
        false
    }

    fn agree(&self, peer: &PublicKey, _auth: &AuthContext) -> SealResult<SharedSecret> {
        let secret = open_secret(&self.vault_key, &self.tag, &self.envelope)
            .inspect_err(|_| log::warn!("key record for tag '{}' could not be opened", self.tag))
            .map_err(SealKitError::into_decryption)?;
        ecies::agree(&secret, peer).map_err(SealKitError::into_decryption)
    }
}

fn open_secret(
    vault_key: &VaultKey,
    tag: &KeyTag,
    envelope: &KeyRecordEnvelope,
) -> SealResult<SecretKey> {
    let sealed = &envelope.sealed_private_key;
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(SealKitError::KeyStore(format!(
            "sealed private key too short: {} bytes (minimum {})",
            sealed.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }
    let (nonce, payload) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(vault_key.as_bytes().into());
    let ad = record_ad(tag);
    let raw = Zeroizing::new(
        cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: payload,
                    aad: &ad,
                },
            )
            .map_err(|_| {
                SealKitError::KeyStore(
                    "failed to open key record: authentication error".to_string(),
                )
            })?,
    );
    let secret = SecretKey::from_slice(&raw)
        .map_err(|_| SealKitError::KeyStore("stored private key is invalid".to_string()))?;

    if ecies::encode_public_key(&secret.public_key()) != envelope.public_key {
        return Err(SealKitError::KeyStore(
            "stored public key does not match the private key".to_string(),
        ));
    }
    Ok(secret)
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn already_exists(tag: &KeyTag) -> SealKitError {
    SealKitError::KeyGenerationFailed(format!("a key pair already exists for tag '{tag}'"))
}

fn record_ad(tag: &KeyTag) -> Vec<u8> {
    let mut ad = Vec::with_capacity(RECORD_AD_PREFIX.len() + tag.as_bytes().len());
    ad.extend_from_slice(RECORD_AD_PREFIX);
    ad.extend_from_slice(tag.as_bytes());
    ad
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
