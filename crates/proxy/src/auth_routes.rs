//! `/auth/*` handlers backing the login page.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use subproxy_types::ProviderKey;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(default)]
    code: Option<String>,
}

/// `POST /auth/oauth/start`
pub async fn oauth_start(State(state): State<Arc<AppState>>) -> Response {
    match state.auth_flow.generate_auth_session().await {
        Ok(session) => Json(json!({
            "success": true,
            "authUrl": session.auth_url,
            "sessionId": session.session_id,
        }))
        .into_response(),
        Err(e) => failure("Failed to start OAuth flow", &e.to_string()),
    }
}

/// `POST /auth/oauth/callback` with `{"code": "<code>#<verifier>"}`.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CallbackBody>,
) -> Response {
    let Some(pasted) = body.code.filter(|c| !c.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing OAuth code", "message": "OAuth code is required"})),
        )
            .into_response();
    };
    let pasted = pasted.trim();
    let (code, verifier) = pasted.split_once('#').unwrap_or((pasted, ""));

    match state.auth_flow.handle_oauth_callback(code, verifier).await {
        Ok(()) => Json(json!({"success": true, "message": "OAuth authentication successful"}))
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "oauth callback failed");
            failure("OAuth callback failed", &e.to_string())
        }
    }
}

/// `POST /auth/login/start`
pub async fn login_start(State(state): State<Arc<AppState>>) -> Response {
    match state.auth_flow.login().await {
        Ok(true) => Json(json!({"success": true, "message": "OAuth authentication successful"}))
            .into_response(),
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "OAuth authentication failed"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": e.to_string()})),
        )
            .into_response(),
    }
}

/// `GET /auth/logout`
pub async fn logout(State(state): State<Arc<AppState>>) -> Response {
    match state.auth_flow.logout().await {
        Ok(()) => Json(json!({"success": true, "message": "Logged out successfully"})).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": e.to_string()})),
        )
            .into_response(),
    }
}

/// `GET /auth/status`. Refreshes an expired token as a side effect.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let authenticated = match state.auth.get_access_token(&ProviderKey::anthropic()).await {
        Ok(token) => token.is_some(),
        Err(e) => {
            tracing::warn!(error = %e, "cannot determine auth status");
            false
        }
    };
    Json(json!({"authenticated": authenticated}))
}

fn failure(error: &str, message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": error, "message": message})),
    )
        .into_response()
}
