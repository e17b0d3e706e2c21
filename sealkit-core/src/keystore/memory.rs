//! In-process key store.
//!
//! Keys live in process memory and vanish with it. A store built with
//! [`MemoryKeyStore::with_secure_element`] behaves like a device with a secure
//! element: it accepts `require_hardware` and gates every use of a
//! hardware-backed private key behind a user-presence check.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use super::{matches_filter, AccessPolicy, KeyStore, PrivateKeyHandle, PublicKeyHandle};
use crate::ecies::{self, SharedSecret};
use crate::error::{SealKitError, SealResult};
use crate::presence::{AuthContext, PresenceError, UserPresence};
use crate::tag::KeyTag;

struct StoredPair {
    secret: Arc<SecretKey>,
    hardware_backed: bool,
    policy: AccessPolicy,
}

struct SecureElement {
    presence: Arc<dyn UserPresence>,
    prompt_on_create: bool,
}

/// In-memory implementation of [`KeyStore`].
pub struct MemoryKeyStore {
    pairs: RwLock<HashMap<KeyTag, StoredPair>>,
    secure_element: Option<SecureElement>,
}

impl MemoryKeyStore {
    /// Creates a software-only store. Hardware requests fail with
    /// [`SealKitError::SecureHardwareUnavailable`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            pairs: RwLock::new(HashMap::new()),
            secure_element: None,
        }
    }

    /// Creates a store with a simulated secure element.
    ///
    /// Hardware-backed keys get [`AccessPolicy::DeviceUnlockedUserPresence`]
    /// and every key agreement with them calls `presence` first.
    #[must_use]
    pub fn with_secure_element(presence: Arc<dyn UserPresence>) -> Self {
        Self {
            pairs: RwLock::new(HashMap::new()),
            secure_element: Some(SecureElement {
                presence,
                prompt_on_create: false,
            }),
        }
    }

    /// Also runs the presence check when a hardware-backed pair is created.
    ///
    /// Has no effect on a software-only store.
    #[must_use]
    pub fn prompt_on_create(mut self, enabled: bool) -> Self {
        if let Some(element) = self.secure_element.as_mut() {
            element.prompt_on_create = enabled;
        }
        self
    }

    /// Number of key pairs currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no key pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<MemoryPrivateKey>> {
        let pairs = self
            .pairs
            .read()
            .map_err(|_| SealKitError::KeyStore("keystore lock poisoned".to_string()))?;
        Ok(pairs
            .get(tag)
            .filter(|pair| matches_filter(pair.hardware_backed, require_hardware))
            .map(|pair| MemoryPrivateKey {
                tag: tag.clone(),
                secret: Arc::clone(&pair.secret),
                hardware_backed: pair.hardware_backed,
                policy: pair.policy,
                presence: self
                    .secure_element
                    .as_ref()
                    .map(|element| Arc::clone(&element.presence)),
            }))
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    fn has_secure_hardware(&self) -> bool {
        self.secure_element.is_some()
    }

    fn find_public_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<PublicKeyHandle>> {
        Ok(self.lookup(tag, require_hardware)?.map(|key| {
            PublicKeyHandle::new(key.tag, key.hardware_backed, key.secret.public_key())
        }))
    }

    fn find_private_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<Box<dyn PrivateKeyHandle>>> {
        Ok(self
            .lookup(tag, require_hardware)?
            .map(|key| Box::new(key) as Box<dyn PrivateKeyHandle>))
    }

    fn create_key_pair(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
        auth: &AuthContext,
    ) -> SealResult<PublicKeyHandle> {
        if require_hardware {
            let Some(element) = self.secure_element.as_ref() else {
                return Err(SealKitError::SecureHardwareUnavailable);
            };
            if element.prompt_on_create {
                element
                    .presence
                    .verify(auth)
                    .map_err(PresenceError::into_key_generation)?;
            }
        }

        let mut pairs = self.pairs.write().map_err(|_| {
            SealKitError::KeyGenerationFailed("keystore lock poisoned".to_string())
        })?;
        if pairs.contains_key(tag) {
            return Err(SealKitError::KeyGenerationFailed(format!(
                "a key pair already exists for tag '{tag}'"
            )));
        }

        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        pairs.insert(
            tag.clone(),
            StoredPair {
                secret: Arc::new(secret),
                hardware_backed: require_hardware,
                policy: AccessPolicy::for_hardware(require_hardware),
            },
        );
        drop(pairs);

        log::debug!(
            "created {} key pair for tag '{tag}'",
            if require_hardware { "hardware-backed" } else { "software" }
        );
        Ok(PublicKeyHandle::new(tag.clone(), require_hardware, public))
    }

    fn delete_all(&self, tag: &KeyTag, require_hardware: bool) -> SealResult<()> {
        let mut pairs = self
            .pairs
            .write()
            .map_err(|_| SealKitError::DeletionFailed("keystore lock poisoned".to_string()))?;
        match pairs.get(tag) {
            Some(pair) if matches_filter(pair.hardware_backed, require_hardware) => {
                pairs.remove(tag);
                Ok(())
            }
            _ => Err(SealKitError::ItemNotFound),
        }
    }
}

struct MemoryPrivateKey {
    tag: KeyTag,
    secret: Arc<SecretKey>,
    hardware_backed: bool,
    policy: AccessPolicy,
    presence: Option<Arc<dyn UserPresence>>,
}

impl PrivateKeyHandle for MemoryPrivateKey {
    fn tag(&self) -> &KeyTag {
        &self.tag
    }

    fn is_hardware_backed(&self) -> bool {
        self.hardware_backed
    }

    fn agree(&self, peer: &PublicKey, auth: &AuthContext) -> SealResult<SharedSecret> {
        if self.policy.requires_presence() {
            let presence = self.presence.as_ref().ok_or_else(|| {
                SealKitError::DecryptionFailed("secure element is not available".to_string())
            })?;
            presence
                .verify(auth)
                .map_err(PresenceError::into_decryption)?;
        }
        ecies::agree(&self.secret, peer).map_err(SealKitError::into_decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{AutoApprove, AutoDeny, PresencePrompt};
    use std::time::Duration;

    fn tag(raw: &str) -> KeyTag {
        KeyTag::new(raw).expect("tag")
    }

    #[test]
    fn test_create_then_find() {
        let store = MemoryKeyStore::new();
        let tag = tag("notes");
        assert!(store.find_public_key(&tag, false).expect("find").is_none());

        let created = store
            .create_key_pair(&tag, false, &AuthContext::default())
            .expect("create");
        let found = store
            .find_public_key(&tag, false)
            .expect("find")
            .expect("present");

        assert_eq!(created, found);
        assert!(!found.is_hardware_backed());
        assert_eq!(found.to_sec1_bytes().len(), ecies::PUBLIC_KEY_LEN);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let store = MemoryKeyStore::new();
        let tag = tag("notes");
        store
            .create_key_pair(&tag, false, &AuthContext::default())
            .expect("create");
        assert!(matches!(
            store.create_key_pair(&tag, false, &AuthContext::default()),
            Err(SealKitError::KeyGenerationFailed(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_hardware_request_without_secure_element() {
        let store = MemoryKeyStore::new();
        assert!(!store.has_secure_hardware());
        assert_eq!(
            store.create_key_pair(&tag("notes"), true, &AuthContext::default()),
            Err(SealKitError::SecureHardwareUnavailable)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_software_key_hidden_from_hardware_lookup() {
        let store = MemoryKeyStore::with_secure_element(Arc::new(AutoApprove));
        let tag = tag("notes");
        store
            .create_key_pair(&tag, false, &AuthContext::default())
            .expect("create");

        assert!(store.find_public_key(&tag, true).expect("find").is_none());
        assert!(store.find_private_key(&tag, true).expect("find").is_none());
        assert_eq!(store.delete_all(&tag, true), Err(SealKitError::ItemNotFound));
        assert_eq!(store.delete_all(&tag, false), Ok(()));
    }

    #[test]
    fn test_hardware_key_agreement_requires_presence() {
        let store = MemoryKeyStore::with_secure_element(Arc::new(AutoDeny));
        let tag = tag("vault");
        let public = store
            .create_key_pair(&tag, true, &AuthContext::default())
            .expect("create");
        let handle = store
            .find_private_key(&tag, true)
            .expect("find")
            .expect("present");

        assert!(handle.is_hardware_backed());
        match handle.agree(public.public_key(), &AuthContext::default()) {
            Err(SealKitError::DecryptionFailed(reason)) => assert!(reason.starts_with("denied")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_prompt_on_create_timeout() {
        let prompt = Arc::new(PresencePrompt::new());
        let store = MemoryKeyStore::with_secure_element(prompt.clone()).prompt_on_create(true);
        let auth = AuthContext::new("create").with_timeout(Duration::from_millis(20));

        match store.create_key_pair(&tag("vault"), true, &auth) {
            Err(SealKitError::KeyGenerationFailed(reason)) => {
                assert!(reason.starts_with("timed out"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(prompt.times_shown(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_missing_tag() {
        let store = MemoryKeyStore::new();
        assert_eq!(
            store.delete_all(&tag("absent"), false),
            Err(SealKitError::ItemNotFound)
        );
    }
}
