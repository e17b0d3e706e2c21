use thiserror::Error;

/// Result type for `SealKit` operations.
pub type SealResult<T> = Result<T, SealKitError>;

/// Error outputs from `SealKit`
///
/// Reason strings carry whatever the key store or crypto primitive reported.
/// They never include plaintext, ciphertext or key bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
pub enum SealKitError {
    /// A hardware-backed key was requested but the store has no secure element
    #[error("secure_hardware_unavailable")]
    SecureHardwareUnavailable,
    /// The key store could not generate or persist a new key pair
    #[error("key_generation_failed: {0}")]
    KeyGenerationFailed(String),
    /// Nothing is stored under the requested tag
    #[error("item_not_found")]
    ItemNotFound,
    /// The key store rejected the deletion
    #[error("deletion_failed: {0}")]
    DeletionFailed(String),
    /// The encoded ciphertext is not valid base64
    #[error("invalid_input_encoding")]
    InvalidInputEncoding,
    /// The payload could not be encrypted
    #[error("encryption_failed: {0}")]
    EncryptionFailed(String),
    /// The payload could not be decrypted (missing key, tampered data, cancelled prompt)
    #[error("decryption_failed: {0}")]
    DecryptionFailed(String),
    /// The key tag is empty, too long or contains a NUL byte
    #[error("invalid_tag: {0}")]
    InvalidTag(String),
    /// A key store lookup failed (I/O, corrupted record, wrong vault key)
    #[error("keystore_error: {0}")]
    KeyStore(String),
}

impl SealKitError {
    /// Whether the same call may succeed if repeated unchanged.
    ///
    /// Creation and deletion failures are retryable. Failures tied to a given
    /// ciphertext or key pair are not, unless the store itself was unavailable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::KeyGenerationFailed(_) | Self::DeletionFailed(_) | Self::KeyStore(_)
        )
    }

    /// Rewraps a lookup failure as an encryption failure.
    pub(crate) fn into_encryption(self) -> Self {
        match self {
            Self::KeyStore(reason) => Self::EncryptionFailed(reason),
            other => other,
        }
    }

    /// Rewraps a store failure during creation as a key generation failure.
    pub(crate) fn into_key_generation(self) -> Self {
        match self {
            Self::KeyStore(reason) => Self::KeyGenerationFailed(reason),
            other => other,
        }
    }

    /// Rewraps a store failure during deletion as a deletion failure.
    pub(crate) fn into_deletion(self) -> Self {
        match self {
            Self::KeyStore(reason) => Self::DeletionFailed(reason),
            other => other,
        }
    }

    /// Rewraps a lookup or agreement failure as a decryption failure.
    pub(crate) fn into_decryption(self) -> Self {
        match self {
            Self::KeyStore(reason) => Self::DecryptionFailed(reason),
            other => other,
        }
    }
}

#[cfg(feature = "ffi")]
impl From<uniffi::UnexpectedUniFFICallbackError> for SealKitError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::KeyStore(error.reason)
    }
}
