//! Find-or-create key provisioning and the encrypt/decrypt entry points.
//!
//! # Provisioning
//!
//! ```text
//! encrypt ─► find_public_key ─┬─ found ──────────────────► seal ─► base64
//!                             └─ absent ─► create_key_pair ─┘
//! decrypt ─► find_private_key ─┬─ found ─► base64 decode ─► open (agree in store)
//!                              └─ absent ─► DecryptionFailed("no key")
//! ```
//!
//! The find-then-create sequence is not atomic. Two first-time encrypts on the
//! same tag may both observe an absent key; the store then rejects the second
//! creation with [`SealKitError::KeyGenerationFailed`] and a retried encrypt
//! finds the winner's key. Callers that need a single creation must serialize
//! encrypts per tag.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::EngineConfig;
use crate::ecies;
use crate::error::{SealKitError, SealResult};
use crate::keystore::{KeyStore, PublicKeyHandle};
use crate::presence::AuthContext;
use crate::tag::KeyTag;

/// Reason carried by [`SealKitError::DecryptionFailed`] when no key exists.
pub const NO_KEY_REASON: &str = "no key";

/// Encrypts and decrypts payloads under the key pair named by its config.
#[derive(Clone)]
pub struct EncryptionEngine {
    store: Arc<dyn KeyStore>,
    config: EngineConfig,
}

impl EncryptionEngine {
    /// Creates an engine over `store`.
    #[must_use]
    pub const fn new(store: Arc<dyn KeyStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Encrypts `plaintext`, creating the key pair on first use.
    ///
    /// # Errors
    ///
    /// See [`EncryptionEngine::encrypt_with`].
    pub fn encrypt(&self, plaintext: &[u8]) -> SealResult<String> {
        self.encrypt_with(plaintext, &self.config.auth_context())
    }

    /// Encrypts `plaintext` with an explicit authentication context.
    ///
    /// `auth` only matters when the store prompts for user presence while
    /// creating a hardware-backed pair.
    ///
    /// # Errors
    ///
    /// - [`SealKitError::SecureHardwareUnavailable`] if hardware is required
    ///   but the store has none.
    /// - [`SealKitError::KeyGenerationFailed`] if the pair could not be
    ///   created (including losing a creation race).
    /// - [`SealKitError::EncryptionFailed`] if the lookup or the cipher failed.
    pub fn encrypt_with(&self, plaintext: &[u8], auth: &AuthContext) -> SealResult<String> {
        let recipient = self.provision(auth)?;
        let ciphertext = ecies::seal(recipient.public_key(), plaintext)?;
        Ok(STANDARD.encode(ciphertext))
    }

    /// Returns the public key under the configured tag, creating the pair if absent.
    ///
    /// # Errors
    ///
    /// Same as [`EncryptionEngine::encrypt_with`], minus cipher failures.
    pub fn provision(&self, auth: &AuthContext) -> SealResult<PublicKeyHandle> {
        let tag = self.config.tag();
        let require_hardware = self.config.requires_hardware();

        if let Some(existing) = self
            .store
            .find_public_key(tag, require_hardware)
            .map_err(SealKitError::into_encryption)?
        {
            return Ok(existing);
        }

        log::info!("no key pair under tag '{tag}', creating one");
        self.store
            .create_key_pair(tag, require_hardware, auth)
            .map_err(SealKitError::into_key_generation)
            .inspect_err(|err| log::warn!("key pair creation for tag '{tag}' failed: {err}"))
    }

    /// Returns the existing public key under the configured tag, never creating one.
    ///
    /// # Errors
    ///
    /// Returns [`SealKitError::KeyStore`] if the store cannot be read.
    pub fn public_key(&self) -> SealResult<Option<PublicKeyHandle>> {
        self.store
            .find_public_key(self.config.tag(), self.config.requires_hardware())
    }

    /// Decrypts a string produced by [`EncryptionEngine::encrypt`].
    ///
    /// # Errors
    ///
    /// See [`EncryptionEngine::decrypt_with`].
    pub fn decrypt(&self, encoded: &str) -> SealResult<Vec<u8>> {
        self.decrypt_with(encoded, &self.config.auth_context())
    }

    /// Decrypts with an explicit authentication context.
    ///
    /// For hardware-backed keys the key agreement blocks on a user-presence
    /// check; cancelling `auth` or letting its timeout elapse aborts it.
    ///
    /// # Errors
    ///
    /// - [`SealKitError::DecryptionFailed`] with reason [`NO_KEY_REASON`] if no
    ///   key pair exists. No key is ever created here.
    /// - [`SealKitError::InvalidInputEncoding`] if `encoded` is not base64.
    /// - [`SealKitError::DecryptionFailed`] on authentication failure, a failed
    ///   presence check or a store error.
    pub fn decrypt_with(&self, encoded: &str, auth: &AuthContext) -> SealResult<Vec<u8>> {
        let handle = self
            .store
            .find_private_key(self.config.tag(), self.config.requires_hardware())
            .map_err(SealKitError::into_decryption)?
            .ok_or_else(|| SealKitError::DecryptionFailed(NO_KEY_REASON.to_string()))?;

        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|_| SealKitError::InvalidInputEncoding)?;

        ecies::open(&ciphertext, |peer| handle.agree(peer, auth))
            .map_err(SealKitError::into_decryption)
    }

    /// Deletes every key stored under the configured tag.
    ///
    /// # Errors
    ///
    /// Returns [`SealKitError::ItemNotFound`] if nothing is stored under the
    /// tag, otherwise [`SealKitError::DeletionFailed`].
    pub fn nuke(&self) -> SealResult<()> {
        let tag = self.config.tag();
        self.store
            .delete_all(tag, self.config.requires_hardware())
            .map_err(SealKitError::into_deletion)?;
        log::info!("deleted key pair under tag '{tag}'");
        Ok(())
    }
}

fn engine_for(
    store: &Arc<dyn KeyStore>,
    tag: &str,
    require_hardware: bool,
) -> SealResult<EncryptionEngine> {
    let config = EngineConfig::new(KeyTag::new(tag)?).with_hardware(require_hardware);
    Ok(EncryptionEngine::new(Arc::clone(store), config))
}

/// Encrypts `plaintext` under the pair stored at `tag`, creating it if absent.
///
/// # Errors
///
/// [`SealKitError::InvalidTag`] for a rejected tag, otherwise as
/// [`EncryptionEngine::encrypt`].
pub fn encrypt(
    store: &Arc<dyn KeyStore>,
    tag: &str,
    require_hardware: bool,
    plaintext: &[u8],
) -> SealResult<String> {
    engine_for(store, tag, require_hardware)?.encrypt(plaintext)
}

/// Decrypts `encoded` with the private key stored at `tag`.
///
/// # Errors
///
/// [`SealKitError::InvalidTag`] for a rejected tag, otherwise as
/// [`EncryptionEngine::decrypt`].
pub fn decrypt(
    store: &Arc<dyn KeyStore>,
    tag: &str,
    require_hardware: bool,
    encoded: &str,
) -> SealResult<Vec<u8>> {
    engine_for(store, tag, require_hardware)?.decrypt(encoded)
}

/// Deletes every key stored at `tag`.
///
/// # Errors
///
/// [`SealKitError::InvalidTag`] for a rejected tag, otherwise as
/// [`EncryptionEngine::nuke`].
pub fn nuke(store: &Arc<dyn KeyStore>, tag: &str, require_hardware: bool) -> SealResult<()> {
    engine_for(store, tag, require_hardware)?.nuke()
}
