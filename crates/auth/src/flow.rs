//! Login collaborator used by the `/auth/*` routes.
//!
//! The Anthropic authorize page redirects to a console page that shows
//! `<code>#<state>` for the user to copy. [`CodePasteFlow`] uses the PKCE
//! verifier as the `state`, so the pasted value carries everything needed
//! to finish the exchange.

use crate::{AuthManager, anthropic, pkce::Pkce};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use subproxy_types::{ProviderKey, ProxyError, traits::Result};

/// A started authorization: where to send the user, and an opaque id for
/// correlating the later callback.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub auth_url: String,
    pub session_id: String,
}

#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Begin an authorization and return the URL the user must visit.
    async fn generate_auth_session(&self) -> Result<AuthSession>;

    /// Finish an authorization with the code the user pasted back.
    async fn handle_oauth_callback(&self, code: &str, verifier: &str) -> Result<()>;

    /// Attempt a non-interactive login; `true` when a usable credential exists afterwards.
    async fn login(&self) -> Result<bool>;

    /// Forget the stored credential.
    async fn logout(&self) -> Result<()>;
}

/// PKCE authorization-code flow where the user pastes the code back.
pub struct CodePasteFlow {
    auth: Arc<AuthManager>,
    provider: ProviderKey,
}

impl CodePasteFlow {
    pub fn new(auth: Arc<AuthManager>) -> Self {
        Self {
            auth,
            provider: ProviderKey::anthropic(),
        }
    }
}

#[async_trait]
impl AuthFlow for CodePasteFlow {
    async fn generate_auth_session(&self) -> Result<AuthSession> {
        let pkce = Pkce::generate();
        let auth_url = anthropic::build_auth_url(&pkce.challenge, &pkce.verifier, self.auth.client_id());
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session_id = %session_id, "authorization session started");
        Ok(AuthSession {
            auth_url,
            session_id,
        })
    }

    async fn handle_oauth_callback(&self, code: &str, verifier: &str) -> Result<()> {
        if code.is_empty() || verifier.is_empty() {
            return Err(ProxyError::Auth("code and verifier are required".into()));
        }
        self.auth
            .exchange_code(&self.provider, code, verifier, verifier)
            .await
    }

    async fn login(&self) -> Result<bool> {
        Ok(self.auth.is_authenticated(&self.provider).await)
    }

    async fn logout(&self) -> Result<()> {
        self.auth.remove_credential(&self.provider).await?;
        tracing::info!(provider = %self.provider, "logged out");
        Ok(())
    }
}
