//! Anthropic OAuth 2.0 endpoints and payloads.
//!
//! Implements the Authorization Code + PKCE (S256) parameters used by the
//! Claude CLI, with the "paste the code" redirect, plus the refresh-token
//! exchange.

use serde::Deserialize;
use serde_json::{Value, json};
use subproxy_types::{Credential, ProxyError, traits::Result};

/// OAuth 2.0 client ID of the Claude CLI.
pub const CLIENT_ID: &str = subproxy_types::provider::ANTHROPIC_OAUTH_CLIENT_ID;

/// Claude OAuth authorization endpoint.
pub const AUTH_URL: &str = "https://claude.ai/oauth/authorize";

/// Claude OAuth token endpoint.
pub const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

/// Redirect target that displays the code for the user to paste back.
pub const REDIRECT_URI: &str = "https://console.anthropic.com/oauth/code/callback";

// Only request user-level scopes; org:create_api_key triggers an API Key
// creation flow that requires Anthropic Console billing.

/// OAuth scopes requested during authorization.
pub const SCOPES: &[&str] = &["user:profile", "user:inference"];

// Scope encoding: `:` -> %3A, space -> +
const SCOPE_ENCODED: &str = "user%3Aprofile+user%3Ainference";
const REDIRECT_URI_ENCODED: &str = "https%3A%2F%2Fconsole.anthropic.com%2Foauth%2Fcode%2Fcallback";

/// Build the authorization URL with PKCE parameters.
///
/// `client_id` must match the one later sent to the token endpoint.
#[must_use]
pub fn build_auth_url(code_challenge: &str, state: &str, client_id: &str) -> String {
    format!(
        "{AUTH_URL}?code=true&client_id={client_id}&response_type=code&redirect_uri={REDIRECT_URI_ENCODED}&scope={SCOPE_ENCODED}&code_challenge={code_challenge}&code_challenge_method=S256&state={state}",
    )
}

/// JSON body exchanging an authorization code for tokens.
#[must_use]
pub fn build_token_request(code: &str, code_verifier: &str, state: &str, client_id: &str) -> Value {
    json!({
        "grant_type": "authorization_code",
        "client_id": client_id,
        "code": code,
        "state": state,
        "redirect_uri": REDIRECT_URI,
        "code_verifier": code_verifier,
    })
}

/// JSON body exchanging a refresh token for a new access token.
#[must_use]
pub fn build_refresh_request(refresh_token: &str, client_id: &str) -> Value {
    json!({
        "grant_type": "refresh_token",
        "refresh_token": refresh_token,
        "client_id": client_id,
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

/// Parse a token endpoint response into a [`Credential`].
///
/// `issued_at_ms` is the wall-clock time of the exchange; the credential
/// expires `expires_in` seconds later. When the response carries no new
/// refresh token, `previous_refresh` is kept.
///
/// # Errors
///
/// Returns [`ProxyError::Auth`] if `access_token` or `expires_in` is missing.
pub fn parse_token_response(
    json: Value,
    issued_at_ms: u64,
    previous_refresh: Option<&str>,
) -> Result<Credential> {
    let resp: TokenResponse = serde_json::from_value(json)
        .map_err(|e| ProxyError::Auth(format!("malformed token response: {e}")))?;
    let refresh = resp
        .refresh_token
        .filter(|r| !r.is_empty())
        .or_else(|| previous_refresh.map(str::to_string));
    let expires = issued_at_ms.saturating_add(resp.expires_in.saturating_mul(1000));
    Ok(Credential::oauth(resp.access_token, refresh, expires))
}
