use std::time::Duration;

/// Text shown by user-presence prompts when the caller sets none.
pub const DEFAULT_PROMPT: &str = "Authenticate to access your encrypted data";

/// How long a user-presence prompt may stay pending by default.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Granularity at which pending prompts re-check their cancellation token.
pub(crate) const PRESENCE_POLL_INTERVAL: Duration = Duration::from_millis(10);
