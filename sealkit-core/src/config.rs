//! Engine configuration.

use std::time::Duration;

use crate::defaults::{DEFAULT_AUTH_TIMEOUT, DEFAULT_PROMPT};
use crate::presence::AuthContext;
use crate::tag::KeyTag;

/// Binds an [`EncryptionEngine`](crate::EncryptionEngine) to one key pair and
/// its provisioning policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    tag: KeyTag,
    require_hardware: bool,
    prompt: String,
    auth_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Software-backed keys under `tag`, default prompt and timeout.
    #[must_use]
    pub fn new(tag: KeyTag) -> Self {
        Self {
            tag,
            require_hardware: false,
            prompt: DEFAULT_PROMPT.to_string(),
            auth_timeout: Some(DEFAULT_AUTH_TIMEOUT),
        }
    }

    /// Requires the key pair to be generated and used inside secure hardware.
    #[must_use]
    pub const fn with_hardware(mut self, require_hardware: bool) -> Self {
        self.require_hardware = require_hardware;
        self
    }

    /// Text shown by user-presence prompts.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Timeout for user-presence prompts; `None` waits until answered or cancelled.
    #[must_use]
    pub const fn with_auth_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Tag of the key pair.
    #[must_use]
    pub const fn tag(&self) -> &KeyTag {
        &self.tag
    }

    /// Whether hardware backing is required.
    #[must_use]
    pub const fn requires_hardware(&self) -> bool {
        self.require_hardware
    }

    /// Builds the authentication context used when the caller supplies none.
    #[must_use]
    pub fn auth_context(&self) -> AuthContext {
        let ctx = AuthContext::new(self.prompt.clone());
        match self.auth_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(KeyTag::new("notes").expect("tag"));
        assert!(!config.requires_hardware());
        let ctx = config.auth_context();
        assert_eq!(ctx.prompt(), DEFAULT_PROMPT);
        assert_eq!(ctx.timeout(), Some(DEFAULT_AUTH_TIMEOUT));
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new(KeyTag::new("notes").expect("tag"))
            .with_hardware(true)
            .with_prompt("Unlock notes")
            .with_auth_timeout(None);
        assert!(config.requires_hardware());
        let ctx = config.auth_context();
        assert_eq!(ctx.prompt(), "Unlock notes");
        assert_eq!(ctx.timeout(), None);
    }
}
