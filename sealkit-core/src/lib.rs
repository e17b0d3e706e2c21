#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Find-or-create P-256 key provisioning and ECIES encryption over a pluggable
//! secure key store.
//!
//! The first [`EncryptionEngine::encrypt`] under a tag creates a key pair in
//! the configured [`KeyStore`]; later calls reuse it. Ciphertexts use the
//! cofactor X9.63 SHA-256 AES-GCM ECIES variant (see [`ecies`]) and are
//! returned base64 encoded. Decryption asks the store to run the key
//! agreement, so the private key never leaves it.
//!
//! ```rust
//! use std::sync::Arc;
//! use sealkit_core::{EncryptionEngine, EngineConfig, KeyTag, MemoryKeyStore};
//!
//! let engine = EncryptionEngine::new(
//!     Arc::new(MemoryKeyStore::new()),
//!     EngineConfig::new(KeyTag::new("notes").unwrap()),
//! );
//! let ciphertext = engine.encrypt(b"hello").unwrap();
//! assert_eq!(engine.decrypt(&ciphertext).unwrap(), b"hello");
//! ```

mod config;
pub use config::*;

/// Default prompt and timeout values.
pub mod defaults;

pub mod ecies;

mod engine;
pub use engine::*;

mod error;
pub use error::*;

pub mod keystore;
pub use keystore::{
    AccessPolicy, FileKeyStore, KeyStore, KeyStorePaths, MemoryKeyStore, PrivateKeyHandle,
    PublicKeyHandle, VaultKey,
};

pub mod logger;

pub mod presence;
pub use presence::{AuthContext, Cancellation, PresenceError, UserPresence};

mod tag;
pub use tag::*;

#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("sealkit_core");
