//! API error type that maps [`ProxyError`] variants to HTTP responses.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use subproxy_types::ProxyError;

/// Shown when no usable credential exists.
pub const LOGIN_HINT: &str =
    "Please authenticate using OAuth first. Visit /auth/login for instructions.";

/// Shown when the upstream rejects the bearer token.
pub const REAUTH_HINT: &str =
    "OAuth token may be expired. Please re-authenticate using /auth/login/start";

/// Wrapper around [`ProxyError`] that implements [`IntoResponse`].
pub struct ApiError(pub ProxyError);

fn auth_error(code: &str, message: String) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": "authentication_error",
            "code": code,
        }
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.needs_reauth() {
            tracing::warn!(error = %self.0, "re-authentication required");
        }
        match self.0 {
            ProxyError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                Json(auth_error("invalid_api_key", msg)),
            )
                .into_response(),
            ProxyError::TokenNotFound(provider) => (
                StatusCode::UNAUTHORIZED,
                Json(auth_error(
                    "token_not_found",
                    format!("no usable {provider} credential. {LOGIN_HINT}"),
                )),
            )
                .into_response(),
            ProxyError::UpstreamAuthExpired { body } => {
                let mut payload = auth_error("upstream_auth_expired", REAUTH_HINT.to_string());
                payload["details"] = body.into();
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            }
            ProxyError::Upstream { status, body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                [(header::CONTENT_TYPE, "text/plain")],
                body,
            )
                .into_response(),
            ProxyError::Translation(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": {
                        "message": msg,
                        "type": "invalid_request_error",
                        "code": "translation_error",
                    }
                })),
            )
                .into_response(),
            other => {
                tracing::error!(error = %other, "proxy error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Proxy error", "details": other.to_string()})),
                )
                    .into_response()
            }
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(e: ProxyError) -> Self {
        Self(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt as _;
    use subproxy_types::ProviderKey;

    async fn extract(err: ProxyError) -> (StatusCode, Option<String>, Vec<u8>) {
        let resp = ApiError(err).into_response();
        let status = resp.status();
        let ct = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, ct, bytes.to_vec())
    }

    async fn extract_json(err: ProxyError) -> (StatusCode, serde_json::Value) {
        let (status, _, bytes) = extract(err).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_auth_error() {
        let (status, body) = extract_json(ProxyError::Auth("bad secret".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
        assert_eq!(body["error"]["code"], "invalid_api_key");
    }

    #[tokio::test]
    async fn test_token_not_found_has_hint() {
        let (status, body) = extract_json(ProxyError::TokenNotFound(ProviderKey::anthropic())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "token_not_found");
        assert!(body["error"]["message"].as_str().unwrap().contains("/auth/login"));
    }

    #[tokio::test]
    async fn test_upstream_auth_expired_carries_details() {
        let (status, body) = extract_json(ProxyError::UpstreamAuthExpired {
            body: "invalid bearer".into(),
        })
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "upstream_auth_expired");
        assert_eq!(body["error"]["message"], REAUTH_HINT);
        assert_eq!(body["details"], "invalid bearer");
    }

    #[tokio::test]
    async fn test_upstream_error_relayed_verbatim() {
        let (status, ct, bytes) = extract(ProxyError::Upstream {
            status: 529,
            body: "{\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\"}}".into(),
        })
        .await;
        assert_eq!(status.as_u16(), 529);
        assert_eq!(ct.as_deref(), Some("text/plain"));
        assert_eq!(bytes, b"{\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\"}}");
    }

    #[tokio::test]
    async fn test_invalid_upstream_status_becomes_bad_gateway() {
        let (status, _, _) = extract(ProxyError::Upstream {
            status: 42,
            body: String::new(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_transport_error_envelope() {
        let (status, body) = extract_json(ProxyError::Http("connection refused".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Proxy error");
        assert!(body["details"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_storage_error_envelope() {
        let (status, body) = extract_json(ProxyError::Storage("disk full".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Proxy error");
    }
}
