//! Secure key store abstraction.
//!
//! A key store holds P-256 key pairs addressed by an application tag. Private
//! keys never leave the store: callers receive a [`PrivateKeyHandle`] whose only
//! capability is an in-place key agreement.
//!
//! # Implementations
//!
//! - [`MemoryKeyStore`]: in-process store with software keys, optionally a
//!   simulated secure element gated by [`UserPresence`](crate::presence::UserPresence)
//! - [`FileKeyStore`]: encrypted key files on disk, software keys only
//! - `ffi::ForeignKeyStore`: adapter over a host-implemented store such as
//!   the iOS Keychain with the Secure Enclave (feature `ffi`)
//!
//! # Lookup Semantics
//!
//! Every operation takes the `require_hardware` flag. When it is `true` only
//! hardware-backed records match; when it is `false` any record under the tag
//! matches. Deletion uses the same filter as lookups.

mod file;
mod memory;
mod paths;
mod record;

pub use file::{FileKeyStore, VaultKey};
pub use memory::MemoryKeyStore;
pub use paths::KeyStorePaths;

use p256::PublicKey;

use crate::ecies::{self, SharedSecret};
use crate::error::SealResult;
use crate::presence::AuthContext;
use crate::tag::KeyTag;

/// Conditions gating the use of a private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Usable whenever the store is reachable.
    Unrestricted,
    /// Usable only while the device is unlocked, on this device only, after a
    /// successful user-presence check.
    DeviceUnlockedUserPresence,
}

impl AccessPolicy {
    /// Policy applied to newly created keys.
    #[must_use]
    pub const fn for_hardware(hardware_backed: bool) -> Self {
        if hardware_backed {
            Self::DeviceUnlockedUserPresence
        } else {
            Self::Unrestricted
        }
    }

    /// Whether using the key triggers a user-presence check.
    #[must_use]
    pub const fn requires_presence(self) -> bool {
        matches!(self, Self::DeviceUnlockedUserPresence)
    }
}

/// Public half of a stored key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyHandle {
    tag: KeyTag,
    hardware_backed: bool,
    key: PublicKey,
}

impl PublicKeyHandle {
    /// Wraps a public key found or created under `tag`.
    #[must_use]
    pub const fn new(tag: KeyTag, hardware_backed: bool, key: PublicKey) -> Self {
        Self {
            tag,
            hardware_backed,
            key,
        }
    }

    /// Tag of the key pair.
    #[must_use]
    pub const fn tag(&self) -> &KeyTag {
        &self.tag
    }

    /// Whether the private half lives in secure hardware.
    #[must_use]
    pub const fn is_hardware_backed(&self) -> bool {
        self.hardware_backed
    }

    /// The public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// SEC1 uncompressed encoding (65 bytes).
    #[must_use]
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        ecies::encode_public_key(&self.key)
    }
}

/// Opaque reference to a private key held by a store.
pub trait PrivateKeyHandle: Send + Sync {
    /// Tag of the key pair.
    fn tag(&self) -> &KeyTag;

    /// Whether the key lives in secure hardware.
    fn is_hardware_backed(&self) -> bool;

    /// Computes the ECDH shared secret with `peer` inside the store.
    ///
    /// Keys whose [`AccessPolicy`] requires user presence run the check first,
    /// which may block until `auth` is answered, cancelled or times out.
    ///
    /// # Errors
    ///
    /// Returns [`DecryptionFailed`](crate::SealKitError::DecryptionFailed) when
    /// the presence check fails (reason prefixed with `cancelled`, `timed out`
    /// or `denied`) or the store cannot perform the agreement.
    fn agree(&self, peer: &PublicKey, auth: &AuthContext) -> SealResult<SharedSecret>;
}

/// Secure repository of P-256 key pairs addressed by tag.
///
/// Each call is atomic with respect to the store's own state, but the store
/// offers no compare-and-swap across calls: find-then-create sequences may race.
pub trait KeyStore: Send + Sync {
    /// Whether the store can create hardware-backed keys.
    fn has_secure_hardware(&self) -> bool;

    /// Looks up the public half of the pair stored under `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStore`](crate::SealKitError::KeyStore) if the store cannot
    /// be read.
    fn find_public_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<PublicKeyHandle>>;

    /// Looks up a handle to the private half of the pair stored under `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStore`](crate::SealKitError::KeyStore) if the store cannot
    /// be read.
    fn find_private_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<Box<dyn PrivateKeyHandle>>>;

    /// Generates and persists a fresh P-256 pair under `tag`.
    ///
    /// # Errors
    ///
    /// - [`SecureHardwareUnavailable`](crate::SealKitError::SecureHardwareUnavailable)
    ///   if `require_hardware` is set and the store has no secure element.
    /// - [`KeyGenerationFailed`](crate::SealKitError::KeyGenerationFailed) if a
    ///   pair already exists under `tag`, the creation-time prompt fails, or
    ///   the store cannot persist the pair.
    fn create_key_pair(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
        auth: &AuthContext,
    ) -> SealResult<PublicKeyHandle>;

    /// Removes every key stored under `tag`.
    ///
    /// # Errors
    ///
    /// - [`ItemNotFound`](crate::SealKitError::ItemNotFound) if nothing matched.
    /// - [`DeletionFailed`](crate::SealKitError::DeletionFailed) if the store
    ///   rejected the deletion.
    fn delete_all(&self, tag: &KeyTag, require_hardware: bool) -> SealResult<()>;
}

/// Whether a record with `hardware_backed` is visible to a lookup with
/// `require_hardware`.
pub(crate) const fn matches_filter(hardware_backed: bool, require_hardware: bool) -> bool {
    hardware_backed || !require_hardware
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_filter() {
        assert!(matches_filter(true, true));
        assert!(matches_filter(true, false));
        assert!(matches_filter(false, false));
        assert!(!matches_filter(false, true));
    }

    #[test]
    fn test_policy_for_hardware() {
        assert!(AccessPolicy::for_hardware(true).requires_presence());
        assert!(!AccessPolicy::for_hardware(false).requires_presence());
    }
}
