//! Provider identity used to key stored credentials.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key under which the Anthropic credential is stored.
pub const ANTHROPIC: &str = "anthropic";

/// OAuth client id of the Claude CLI application.
pub const ANTHROPIC_OAUTH_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";

/// Identifies the upstream a credential belongs to (e.g. `"anthropic"`).
///
/// Stored as a plain string so that credential files written by other tools
/// with additional provider entries still load; unknown keys round-trip
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderKey(String);

impl ProviderKey {
    /// Creates a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key of the Anthropic upstream.
    #[must_use]
    pub fn anthropic() -> Self {
        Self(ANTHROPIC.to_string())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ProviderKey {
    type Err = crate::ProxyError;

    /// Parse a provider name or well-known alias into a [`ProviderKey`].
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`](crate::ProxyError::Config) for an empty name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(crate::ProxyError::Config("empty provider name".into())),
            "claude" | "anthropic" => Ok(Self::anthropic()),
            other => Ok(Self::new(other.to_ascii_lowercase())),
        }
    }
}

impl From<&str> for ProviderKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
