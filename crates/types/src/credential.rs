//! OAuth credential representation and expiry logic.

use crate::ProviderKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The `type` tag of an OAuth credential record.
pub const OAUTH_KIND: &str = "oauth";

/// Discriminates OAuth credentials from other record kinds (e.g. raw API keys)
/// that may share the same credential file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CredentialKind {
    OAuth,
    /// Any other tag, preserved verbatim so rewrites are lossless.
    Other(String),
}

impl From<String> for CredentialKind {
    fn from(s: String) -> Self {
        if s == OAUTH_KIND {
            Self::OAuth
        } else {
            Self::Other(s)
        }
    }
}

impl From<CredentialKind> for String {
    fn from(kind: CredentialKind) -> Self {
        match kind {
            CredentialKind::OAuth => OAUTH_KIND.to_string(),
            CredentialKind::Other(s) => s,
        }
    }
}

/// One stored credential.
///
/// Serialized as `{"type":"oauth","access":..,"refresh":..,"expires":<epoch ms>}`.
/// `expires` is the wall-clock instant after which `access` must not be used
/// without refreshing first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    #[serde(default)]
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(default)]
    pub expires: u64,
    /// Fields this crate does not interpret (kept for lossless rewrites).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Mapping from provider key to its credential. Serialized as one JSON object.
pub type CredentialSet = BTreeMap<ProviderKey, Credential>;

impl Credential {
    /// Creates an OAuth credential.
    pub fn oauth(
        access: impl Into<String>,
        refresh: Option<String>,
        expires_at_ms: u64,
    ) -> Self {
        Self {
            kind: CredentialKind::OAuth,
            access: access.into(),
            refresh,
            expires: expires_at_ms,
            extra: Map::new(),
        }
    }

    /// Returns `true` for OAuth records.
    #[must_use]
    pub fn is_oauth(&self) -> bool {
        self.kind == CredentialKind::OAuth
    }

    /// The refresh token, treating an empty string as absent.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh.as_deref().filter(|r| !r.is_empty())
    }

    /// Determine the token state at `now_ms` (milliseconds since the epoch).
    #[must_use]
    pub fn state_at(&self, now_ms: u64) -> TokenState {
        if !self.is_oauth() {
            TokenState::Invalid
        } else if now_ms < self.expires {
            TokenState::Valid
        } else if self.refresh_token().is_some() {
            TokenState::Expired
        } else {
            TokenState::Invalid
        }
    }
}

/// Describes the usability state of a [`Credential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Valid,
    /// Expired but a refresh token is available for renewal.
    Expired,
    /// Not an OAuth record, or expired with no refresh token.
    Invalid,
}
