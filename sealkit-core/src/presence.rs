//! User-presence checks gating hardware-backed private keys.
//!
//! On a device the check is a biometric or passcode prompt raised by the OS
//! when a protected key is used. Here it is modelled as a blocking call that
//! ends when the user approves, the user denies, the caller cancels through a
//! [`Cancellation`] token, or the [`AuthContext`] timeout elapses.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::defaults::{DEFAULT_PROMPT, PRESENCE_POLL_INTERVAL};
use crate::error::SealKitError;

/// Outcome of a failed user-presence check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresenceError {
    /// The caller cancelled the pending prompt.
    #[error("cancelled: user presence prompt was cancelled")]
    Cancelled,
    /// The prompt was not answered before the timeout.
    #[error("timed out: user presence prompt was not answered in time")]
    TimedOut,
    /// The user (or the platform) refused authentication.
    #[error("denied: {0}")]
    Denied(String),
}

impl PresenceError {
    /// Surfaces the failure of a prompt raised while generating a key.
    #[must_use]
    pub fn into_key_generation(self) -> SealKitError {
        SealKitError::KeyGenerationFailed(self.to_string())
    }

    /// Surfaces the failure of a prompt raised while using a private key.
    #[must_use]
    pub fn into_decryption(self) -> SealKitError {
        SealKitError::DecryptionFailed(self.to_string())
    }
}

/// Cloneable token used to abort a pending prompt from another thread.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every operation observing this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`Cancellation::cancel`] was called on this token or a clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-call authentication parameters threaded into the key store.
#[derive(Debug, Clone)]
pub struct AuthContext {
    prompt: String,
    timeout: Option<Duration>,
    cancellation: Cancellation,
}

impl AuthContext {
    /// Creates a context showing `prompt`, without timeout.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            timeout: None,
            cancellation: Cancellation::new(),
        }
    }

    /// Aborts the prompt with [`PresenceError::TimedOut`] after `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Observes `cancellation` while the prompt is pending.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Text shown to the user by the prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Timeout for the prompt, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Cancellation token observed by the prompt.
    #[must_use]
    pub const fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}

/// Verifies that the user is present before a protected key is used.
pub trait UserPresence: Send + Sync {
    /// Blocks until the user approves or the check fails.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Cancelled`] when `ctx` is cancelled,
    /// [`PresenceError::TimedOut`] when its timeout elapses and
    /// [`PresenceError::Denied`] when authentication is refused.
    fn verify(&self, ctx: &AuthContext) -> Result<(), PresenceError>;
}

/// Approves every check that has not already been cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl UserPresence for AutoApprove {
    fn verify(&self, ctx: &AuthContext) -> Result<(), PresenceError> {
        if ctx.cancellation().is_cancelled() {
            return Err(PresenceError::Cancelled);
        }
        Ok(())
    }
}

/// Denies every check.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDeny;

impl UserPresence for AutoDeny {
    fn verify(&self, _ctx: &AuthContext) -> Result<(), PresenceError> {
        Err(PresenceError::Denied("authentication failed".to_string()))
    }
}

#[derive(Debug, Clone)]
enum PromptState {
    Pending,
    Approved,
    Denied(String),
}

/// A prompt answered from another thread, like an OS biometric sheet.
///
/// Checks block while the prompt is pending. The answer is sticky until
/// [`PresencePrompt::reset`] is called.
#[derive(Debug)]
pub struct PresencePrompt {
    state: Mutex<PromptState>,
    answered: Condvar,
    shown: AtomicUsize,
}

impl PresencePrompt {
    /// Creates a pending prompt.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(PromptState::Pending),
            answered: Condvar::new(),
            shown: AtomicUsize::new(0),
        }
    }

    /// Approves the current and all following checks.
    pub fn approve(&self) {
        self.answer(PromptState::Approved);
    }

    /// Denies the current and all following checks.
    pub fn deny(&self, reason: impl Into<String>) {
        self.answer(PromptState::Denied(reason.into()));
    }

    /// Puts the prompt back into the pending state.
    pub fn reset(&self) {
        self.answer(PromptState::Pending);
    }

    /// Number of checks that reached this prompt.
    #[must_use]
    pub fn times_shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }

    fn answer(&self, answer: PromptState) {
        // A poisoned lock only means a verifier panicked; the state is still valid.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = answer;
        self.answered.notify_all();
    }
}

impl Default for PresencePrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl UserPresence for PresencePrompt {
    fn verify(&self, ctx: &AuthContext) -> Result<(), PresenceError> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        let deadline = ctx
            .timeout()
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            match &*state {
                PromptState::Approved => return Ok(()),
                PromptState::Denied(reason) => {
                    return Err(PresenceError::Denied(reason.clone()))
                }
                PromptState::Pending => {}
            }
            if ctx.cancellation().is_cancelled() {
                return Err(PresenceError::Cancelled);
            }
            let mut wait = PRESENCE_POLL_INTERVAL;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(PresenceError::TimedOut);
                }
                wait = wait.min(deadline - now);
            }
            state = self
                .answered
                .wait_timeout(state, wait)
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .0;
        }
    }
}
