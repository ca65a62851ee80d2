//! In-memory API credential
//!
//! The key is read once from the environment and handed explicitly to the
//! verifier. It has no `Display`, no `Serialize`, and a redacting `Debug`,
//! so it cannot end up in logs, reports or files by accident.

use std::fmt;

/// Environment variable the key is read from unless configured otherwise
pub const DEFAULT_API_KEY_ENV: &str = "AQEA_API_KEY";

/// Request header carrying the key
pub const API_KEY_HEADER: &str = "X-API-Key";

const REDACTED: &str = "<redacted>";

/// Opaque holder for the API key
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,
}

impl Credential {
    /// Wrap a key; blank keys are treated as absent
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            None
        } else {
            Some(Self { secret })
        }
    }

    /// Read the key from `var`; unset, blank or non-UTF-8 values yield `None`
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var).ok().and_then(Self::new)
    }

    /// Header value for outgoing requests. Only transports call this.
    pub(crate) fn expose(&self) -> &str {
        &self.secret
    }

    /// Replace every occurrence of the key in `text`
    pub fn redact(&self, text: &str) -> String {
        text.replace(&self.secret, REDACTED)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", REDACTED)
    }
}
