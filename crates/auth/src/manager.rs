//! Credential lifecycle for OAuth-backed upstreams.
//!
//! Responsibilities:
//! - Load credentials from a [`CredentialStore`].
//! - Hand out the stored access token while it is still valid.
//! - Refresh expired tokens at the token endpoint and persist the result.
//! - Coalesce concurrent refreshes of the same provider into one request.
use crate::anthropic;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use subproxy_types::{
    Clock, Credential, CredentialStore, ProviderKey, SystemClock, TokenState, traits::Result,
};

pub struct AuthManager {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    token_url: String,
    client_id: String,
    refresh_locks: Mutex<HashMap<ProviderKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl AuthManager {
    pub fn new(store: Arc<dyn CredentialStore>, http: reqwest::Client) -> Self {
        Self {
            store,
            http,
            clock: Arc::new(SystemClock),
            token_url: anthropic::TOKEN_URL.to_string(),
            client_id: anthropic::CLIENT_ID.to_string(),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the token endpoint (used by tests and custom deployments).
    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// OAuth client id used for authorization, code exchange and refresh.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return a usable access token for `provider`, refreshing it if expired.
    ///
    /// `Ok(None)` means the caller has to authenticate again: there is no
    /// credential, it is not an OAuth credential, it expired without a
    /// refresh token, or the token endpoint refused the refresh.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Storage`](subproxy_types::ProxyError::Storage)
    /// if the store cannot be read or written, and
    /// [`ProxyError::Http`](subproxy_types::ProxyError::Http) if the token
    /// endpoint is unreachable or answers with a non-JSON body.
    pub async fn get_access_token(&self, provider: &ProviderKey) -> Result<Option<String>> {
        let Some(cred) = self.store.get(provider).await? else {
            return Ok(None);
        };
        match cred.state_at(self.clock.now_ms()) {
            TokenState::Valid => return Ok(Some(cred.access)),
            TokenState::Invalid => return Ok(None),
            TokenState::Expired => {}
        }

        let lock = self.refresh_lock(provider);
        let _guard = lock.lock().await;

        // Another request may have refreshed while we waited for the lock.
        let Some(cred) = self.store.get(provider).await? else {
            return Ok(None);
        };
        match cred.state_at(self.clock.now_ms()) {
            TokenState::Valid => Ok(Some(cred.access)),
            TokenState::Invalid => Ok(None),
            TokenState::Expired => self.refresh(provider, &cred).await,
        }
    }

    /// Check whether the provider has a credential that is valid or refreshable.
    pub async fn is_authenticated(&self, provider: &ProviderKey) -> bool {
        match self.store.get(provider).await {
            Ok(Some(c)) => c.state_at(self.clock.now_ms()) != TokenState::Invalid,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "cannot read credential store");
                false
            }
        }
    }

    /// Persist a new credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails to persist the credential.
    pub async fn save_credential(&self, provider: &ProviderKey, credential: &Credential) -> Result<()> {
        self.store.set(provider, credential).await
    }

    /// Remove a credential (logout).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails to remove the credential.
    pub async fn remove_credential(&self, provider: &ProviderKey) -> Result<()> {
        self.store.remove(provider).await
    }

    /// Exchange an authorization code for a credential and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Auth`](subproxy_types::ProxyError::Auth) if the
    /// token endpoint rejects the code, `Http` on transport failure, or
    /// `Storage` if the credential cannot be saved.
    pub async fn exchange_code(
        &self,
        provider: &ProviderKey,
        code: &str,
        verifier: &str,
        state: &str,
    ) -> Result<()> {
        let body = anthropic::build_token_request(code, verifier, state, &self.client_id);
        let resp = self.http.post(&self.token_url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(subproxy_types::ProxyError::Auth(format!(
                "code exchange failed ({status}): {text}"
            )));
        }
        let json: Value = resp.json().await?;
        let cred = anthropic::parse_token_response(json, self.clock.now_ms(), None)?;
        self.store.set(provider, &cred).await?;
        tracing::info!(provider = %provider, "credential stored from authorization code");
        Ok(())
    }

    fn refresh_lock(&self, provider: &ProviderKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(provider.clone()).or_default())
    }

    async fn refresh(&self, provider: &ProviderKey, cred: &Credential) -> Result<Option<String>> {
        let Some(refresh_token) = cred.refresh_token() else {
            return Ok(None);
        };
        tracing::debug!(provider = %provider, "refreshing expired access token");

        let body = anthropic::build_refresh_request(refresh_token, &self.client_id);
        let resp = self.http.post(&self.token_url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(provider = %provider, status = status.as_u16(), body = %text, "token refresh rejected");
            return Ok(None);
        }

        let json: Value = resp.json().await?;
        let fresh = match anthropic::parse_token_response(json, self.clock.now_ms(), Some(refresh_token)) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "token refresh returned an unusable body");
                return Ok(None);
            }
        };
        self.store.set(provider, &fresh).await?;
        tracing::info!(provider = %provider, expires = fresh.expires, "access token refreshed");
        Ok(Some(fresh.access))
    }
}
