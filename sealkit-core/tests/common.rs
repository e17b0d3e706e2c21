//! Common test utilities shared across integration tests.

#![allow(dead_code, reason = "each test binary uses a subset")]
#![allow(missing_docs, reason = "test helpers")]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use p256::PublicKey;
use sealkit_core::ecies::SharedSecret;
use sealkit_core::{
    AuthContext, EncryptionEngine, EngineConfig, FileKeyStore, KeyStore, KeyTag,
    PrivateKeyHandle, PublicKeyHandle, SealResult, VaultKey,
};

/// Counts calls to the wrapped store and the agreements of its handles.
pub struct CountingStore<S> {
    inner: S,
    creates: AtomicUsize,
    agreements: Arc<AtomicUsize>,
}

impl<S: KeyStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            creates: AtomicUsize::new(0),
            agreements: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn agreements(&self) -> usize {
        self.agreements.load(Ordering::SeqCst)
    }
}

struct CountingHandle {
    inner: Box<dyn PrivateKeyHandle>,
    agreements: Arc<AtomicUsize>,
}

impl PrivateKeyHandle for CountingHandle {
    fn tag(&self) -> &KeyTag {
        self.inner.tag()
    }

    fn is_hardware_backed(&self) -> bool {
        self.inner.is_hardware_backed()
    }

    fn agree(&self, peer: &PublicKey, auth: &AuthContext) -> SealResult<SharedSecret> {
        self.agreements.fetch_add(1, Ordering::SeqCst);
        self.inner.agree(peer, auth)
    }
}

impl<S: KeyStore> KeyStore for CountingStore<S> {
    fn has_secure_hardware(&self) -> bool {
        self.inner.has_secure_hardware()
    }

    fn find_public_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<PublicKeyHandle>> {
        self.inner.find_public_key(tag, require_hardware)
    }

    fn find_private_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<Box<dyn PrivateKeyHandle>>> {
        let agreements = Arc::clone(&self.agreements);
        Ok(self
            .inner
            .find_private_key(tag, require_hardware)?
            .map(|inner| {
                Box::new(CountingHandle { inner, agreements }) as Box<dyn PrivateKeyHandle>
            }))
    }

    fn create_key_pair(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
        auth: &AuthContext,
    ) -> SealResult<PublicKeyHandle> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_key_pair(tag, require_hardware, auth)
    }

    fn delete_all(&self, tag: &KeyTag, require_hardware: bool) -> SealResult<()> {
        self.inner.delete_all(tag, require_hardware)
    }
}

/// Holds every public-key lookup until `parties` lookups have completed, so
/// concurrent first-time encrypts all observe an absent key.
pub struct LockstepStore<S> {
    inner: S,
    barrier: Barrier,
    lookups: AtomicUsize,
    parties: usize,
}

impl<S: KeyStore> LockstepStore<S> {
    pub const fn new(inner: S, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
            lookups: AtomicUsize::new(0),
            parties,
        }
    }
}

impl<S: KeyStore> KeyStore for LockstepStore<S> {
    fn has_secure_hardware(&self) -> bool {
        self.inner.has_secure_hardware()
    }

    fn find_public_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<PublicKeyHandle>> {
        let found = self.inner.find_public_key(tag, require_hardware);
        // Only the first round of lookups is synchronized; retries run freely.
        if self.lookups.fetch_add(1, Ordering::SeqCst) < self.parties {
            self.barrier.wait();
        }
        found
    }

    fn find_private_key(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
    ) -> SealResult<Option<Box<dyn PrivateKeyHandle>>> {
        self.inner.find_private_key(tag, require_hardware)
    }

    fn create_key_pair(
        &self,
        tag: &KeyTag,
        require_hardware: bool,
        auth: &AuthContext,
    ) -> SealResult<PublicKeyHandle> {
        self.inner.create_key_pair(tag, require_hardware, auth)
    }

    fn delete_all(&self, tag: &KeyTag, require_hardware: bool) -> SealResult<()> {
        self.inner.delete_all(tag, require_hardware)
    }
}

pub fn tag(raw: &str) -> KeyTag {
    KeyTag::new(raw).expect("valid tag")
}

pub fn engine(
    store: Arc<dyn KeyStore>,
    raw_tag: &str,
    require_hardware: bool,
) -> EncryptionEngine {
    EncryptionEngine::new(
        store,
        EngineConfig::new(tag(raw_tag)).with_hardware(require_hardware),
    )
}

pub fn temp_root() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("sealkit-test-")
        .tempdir()
        .expect("create temp dir")
}

pub fn open_file_store(root: &Path, vault_key: &[u8; 32]) -> FileKeyStore {
    FileKeyStore::open(root, VaultKey::from_bytes(*vault_key)).expect("open file store")
}

pub fn key_files(root: &Path) -> Vec<PathBuf> {
    let paths = sealkit_core::KeyStorePaths::new(root);
    std::fs::read_dir(paths.keys_dir())
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .collect()
        })
        .unwrap_or_default()
}
