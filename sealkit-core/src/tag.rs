//! Application tags addressing key pairs inside a key store.

use std::fmt;

use crate::error::{SealKitError, SealResult};

/// Maximum tag length in bytes.
pub const MAX_TAG_LEN: usize = 256;

/// Caller-chosen identifier of one logical key pair.
///
/// A tag addresses at most one key pair in a store at a time. Re-using a tag
/// after the pair was deleted is valid and yields a fresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyTag(String);

impl KeyTag {
    /// Validates and wraps a tag.
    ///
    /// # Errors
    ///
    /// Returns [`SealKitError::InvalidTag`] if the tag is empty, longer than
    /// [`MAX_TAG_LEN`] bytes or contains a NUL byte.
    pub fn new(tag: impl Into<String>) -> SealResult<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(SealKitError::InvalidTag("tag is empty".to_string()));
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(SealKitError::InvalidTag(format!(
                "tag is {} bytes (maximum {MAX_TAG_LEN})",
                tag.len()
            )));
        }
        if tag.contains('\0') {
            return Err(SealKitError::InvalidTag(
                "tag contains a NUL byte".to_string(),
            ));
        }
        Ok(Self(tag))
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tag bytes, as stored in the application-tag attribute.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for KeyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for KeyTag {
    type Error = SealKitError;

    fn try_from(value: &str) -> SealResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for KeyTag {
    type Error = SealKitError;

    fn try_from(value: String) -> SealResult<Self> {
        Self::new(value)
    }
}
