//! UniFFI surface for Swift and Kotlin hosts.
//!
//! Hosts either use one of the built-in stores or implement
//! [`PlatformKeyStore`] over the platform keychain (on iOS, the Keychain with
//! Secure Enclave keys). The private key never crosses the boundary: decryption
//! asks the host to perform the key agreement and return the shared secret.

use std::sync::Arc;

use p256::PublicKey;

use crate::config::EngineConfig;
use crate::ecies::{self, SharedSecret};
use crate::engine::EncryptionEngine;
use crate::error::{SealKitError, SealResult};
use crate::keystore::{
    FileKeyStore, KeyStore, MemoryKeyStore, PrivateKeyHandle, PublicKeyHandle, VaultKey,
};
use crate::presence::{AuthContext, PresenceError};
use crate::tag::KeyTag;

/// A key pair as reported by the host keystore.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct PlatformKey {
    /// SEC1 uncompressed public key (65 bytes).
    pub public_key: Vec<u8>,
    /// Whether the private half lives in secure hardware.
    pub hardware_backed: bool,
}

/// Host-implemented keystore.
///
/// Every lookup and deletion receives `require_hardware`: when set only
/// hardware-backed keys match, otherwise any key under the tag matches.
#[uniffi::export(with_foreign)]
pub trait PlatformKeyStore: Send + Sync {
    /// Whether the device can create hardware-backed keys.
    fn has_secure_hardware(&self) -> bool;

    /// Returns the public half of the pair under `tag`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore cannot be queried.
    fn copy_public_key(
        &self,
        tag: String,
        require_hardware: bool,
    ) -> SealResult<Option<PlatformKey>>;

    /// Reports whether a private key exists under `tag` without using it.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore cannot be queried.
    fn lookup_private_key(
        &self,
        tag: String,
        require_hardware: bool,
    ) -> SealResult<Option<PlatformKey>>;

    /// Generates a P-256 pair under `tag`.
    ///
    /// Hardware-backed keys must be usable only while the device is unlocked,
    /// on this device only, and after user presence.
    ///
    /// # Errors
    ///
    /// `SecureHardwareUnavailable` when hardware is required but absent,
    /// `KeyGenerationFailed` otherwise.
    fn generate_key_pair(
        &self,
        tag: String,
        require_hardware: bool,
        prompt: String,
        timeout_ms: Option<u64>,
    ) -> SealResult<PlatformKey>;

    /// Performs cofactor ECDH between the private key under `tag` and
    /// `peer_public_key`, returning the 32-byte shared secret.
    ///
    /// # Errors
    ///
    /// `DecryptionFailed` if the user-presence check or the agreement fails.
    fn key_exchange(
        &self,
        tag: String,
        require_hardware: bool,
        peer_public_key: Vec<u8>,
        prompt: String,
        timeout_ms: Option<u64>,
    ) -> SealResult<Vec<u8>>;

    /// Deletes every key under `tag`.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` if nothing matched, `DeletionFailed` otherwise.
    fn delete_all(&self, tag: String, require_hardware: bool) -> SealResult<()>;
}

/// [`KeyStore`] adapter over a [`PlatformKeyStore`].
pub struct ForeignKeyStore {
    platform: Arc<dyn PlatformKeyStore>,
}

impl ForeignKeyStore {
    /// Wraps a host keystore.
    #[must_use]
    pub const fn new(platform: Arc<dyn PlatformKeyStore>) -> Self {
        Self { platform }
    }
}

fn timeout_ms(auth: &AuthContext) -> Option<u64> {
    auth.timeout()
        .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
}

fn public_key_handle(tag: &KeyTag, key: &PlatformKey) -> SealResult<PublicKeyHandle> {
    let public_key = PublicKey::from_sec1_bytes(&key.public_key).map_err(|_| {
        SealKitError::KeyStore(format!("host returned a malformed public key for tag '{tag}'"))
    })?;
    Ok(PublicKeyHandle::new(
        tag.clone(),
        key.hardware_backed,
        public_key,
    ))
}

impl KeyStore for ForeignKeyStore {
    fn has_secure_hardware(&self) -> bool {
        self.platform.has_secure_hardware()
    }

    fn find_public_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<PublicKeyHandle>> {
        self.platform
            .copy_public_key(tag.to_string(), require_hardware)?
            .map(|key| public_key_handle(tag, &key))
            .transpose()
    }

    fn find_private_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<Box<dyn PrivateKeyHandle>>> {
        let found = self
            .platform
            .lookup_private_key(tag.to_string(), require_hardware)?;
        Ok(found.map(|key| {
            Box::new(ForeignPrivateKey {
                platform: Arc::clone(&self.platform),
                tag: tag.clone(),
                require_hardware,
                hardware_backed: key.hardware_backed,
            }) as Box<dyn PrivateKeyHandle>
        }))
    }

    fn create_key_pair(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
        auth: &AuthContext,
    ) -> SealResult<PublicKeyHandle> {
        if require_hardware && !self.platform.has_secure_hardware() {
            return Err(SealKitError::SecureHardwareUnavailable);
        }
        if auth.cancellation().is_cancelled() {
            return Err(PresenceError::Cancelled.into_key_generation());
        }
        let created = self.platform.generate_key_pair(
            tag.to_string(),
            require_hardware,
            auth.prompt().to_string(),
            timeout_ms(auth),
        )?;
        public_key_handle(tag, &created).map_err(|err| {
            SealKitError::KeyGenerationFailed(format!("unusable generated key: {err}"))
        })
    }

    fn delete_all(&self, tag: &KeyTag, require_hardware: bool) -> SealResult<()> {
        self.platform.delete_all(tag.to_string(), require_hardware)
    }
}

struct ForeignPrivateKey {
    platform: Arc<dyn PlatformKeyStore>,
    tag: KeyTag,
    require_hardware: bool,
    hardware_backed: bool,
}

impl PrivateKeyHandle for ForeignPrivateKey {
    fn tag(&self) -> &KeyTag {
        &self.tag
    }

    fn is_hardware_backed(&self) -> bool {
        self.hardware_backed
    }

    fn agree(&self, peer: &PublicKey, auth: &AuthContext) -> SealResult<SharedSecret> {
        if auth.cancellation().is_cancelled() {
            return Err(PresenceError::Cancelled.into_decryption());
        }
        let secret = self.platform.key_exchange(
            self.tag.to_string(),
            self.require_hardware,
            ecies::encode_public_key(peer),
            auth.prompt().to_string(),
            timeout_ms(auth),
        )?;
        SharedSecret::from_slice(&secret)
    }
}

/// Encrypts and decrypts under one tagged key pair.
#[derive(uniffi::Object)]
pub struct Encryptor {
    engine: EncryptionEngine,
}

impl Encryptor {
    fn build(store: Arc<dyn KeyStore>, tag: String, require_hardware: bool) -> SealResult<Self> {
        let config = EngineConfig::new(KeyTag::new(tag)?).with_hardware(require_hardware);
        Ok(Self {
            engine: EncryptionEngine::new(store, config),
        })
    }
}

#[uniffi::export]
impl Encryptor {
    /// Creates an encryptor over a host keystore.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` if `tag` is rejected.
    #[uniffi::constructor]
    pub fn new(
        platform: Arc<dyn PlatformKeyStore>,
        tag: String,
        require_hardware: bool,
    ) -> SealResult<Self> {
        Self::build(
            Arc::new(ForeignKeyStore::new(platform)),
            tag,
            require_hardware,
        )
    }

    /// Creates an encryptor whose software keys live in process memory.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` if `tag` is rejected.
    #[uniffi::constructor]
    pub fn in_memory(tag: String) -> SealResult<Self> {
        Self::build(Arc::new(MemoryKeyStore::new()), tag, false)
    }

    /// Creates an encryptor over key files under `root`, sealed with the
    /// 32-byte `vault_key`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for a rejected tag and `KeyStore` for a malformed
    /// vault key or an unusable directory.
    #[uniffi::constructor]
    #[allow(clippy::needless_pass_by_value)]
    pub fn with_file_store(root: String, vault_key: Vec<u8>, tag: String) -> SealResult<Self> {
        let bytes: [u8; 32] = vault_key
            .as_slice()
            .try_into()
            .map_err(|_| SealKitError::KeyStore("vault key must be 32 bytes".to_string()))?;
        let store = FileKeyStore::open(root, VaultKey::from_bytes(bytes))?;
        Self::build(Arc::new(store), tag, false)
    }

    /// Encrypts `plaintext`, creating the key pair on first use.
    ///
    /// # Errors
    ///
    /// See [`EncryptionEngine::encrypt_with`].
    #[allow(clippy::needless_pass_by_value)]
    pub fn encrypt(&self, plaintext: Vec<u8>) -> SealResult<String> {
        self.engine.encrypt(&plaintext)
    }

    /// Decrypts a base64 ciphertext produced by [`Encryptor::encrypt`].
    ///
    /// # Errors
    ///
    /// See [`EncryptionEngine::decrypt_with`].
    #[allow(clippy::needless_pass_by_value)]
    pub fn decrypt(&self, ciphertext: String) -> SealResult<Vec<u8>> {
        self.engine.decrypt(&ciphertext)
    }

    /// Deletes every key stored under this encryptor's tag.
    ///
    /// # Errors
    ///
    /// See [`EncryptionEngine::nuke`].
    pub fn nuke(&self) -> SealResult<()> {
        self.engine.nuke()
    }
}
