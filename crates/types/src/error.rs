//! Unified error type for the subproxy workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across subproxy crates.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The caller's secret did not match the configured API key.
    #[error("authentication error: {0}")]
    Auth(String),

    /// No usable OAuth credential exists for the given provider.
    #[error("no usable credential for provider: {0}")]
    TokenNotFound(crate::ProviderKey),

    /// The upstream rejected the bearer token (HTTP 401).
    #[error("upstream rejected the credential: {body}")]
    UpstreamAuthExpired { body: String },

    /// The upstream provider returned a non-success status other than 401.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    /// HTTP transport error reaching the upstream or the token endpoint.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The credential record could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Request or response format translation failure.
    #[error("translation error: {0}")]
    Translation(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl ProxyError {
    /// Returns `true` if the caller should re-run the OAuth login.
    #[must_use]
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::TokenNotFound(_) | Self::UpstreamAuthExpired { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_auth() {
        let err = ProxyError::Auth("bad secret".to_string());
        assert_eq!(err.to_string(), "authentication error: bad secret");
    }

    #[test]
    fn test_error_display_token_not_found() {
        let err = ProxyError::TokenNotFound(crate::ProviderKey::anthropic());
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn test_error_display_upstream() {
        let err = ProxyError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("429"));
        assert!(s.contains("rate limited"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid {{{").unwrap_err();
        let err: ProxyError = json_err.into();
        assert!(matches!(err, ProxyError::Serialization(_)));
    }

    #[test]
    fn test_needs_reauth() {
        assert!(ProxyError::TokenNotFound(crate::ProviderKey::anthropic()).needs_reauth());
        assert!(
            ProxyError::UpstreamAuthExpired {
                body: String::new()
            }
            .needs_reauth()
        );
        assert!(!ProxyError::Auth("bad".into()).needs_reauth());
        assert!(
            !ProxyError::Upstream {
                status: 500,
                body: String::new()
            }
            .needs_reauth()
        );
        assert!(!ProxyError::Http("refused".into()).needs_reauth());
    }
}
