//! Chat request orchestration.
//!
//! Both `/v1/chat/completions` and `/v1/messages` land here. The request is
//! checked against the configured caller secret, answered locally if it is
//! an editor capability probe, rewritten by the disguise transform, and
//! forwarded to the Anthropic Messages API with the stored OAuth token.
//!
//! Rewritten requests get their response converted to the `OpenAI` format
//! (chunk by chunk when streaming); requests that already looked like CLI
//! traffic are relayed byte for byte.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt as _};
use std::{pin::Pin, sync::Arc, time::Duration};
use subproxy_config::Config;
use subproxy_translate::{AnthropicToOpenAI, StreamTranslator, TranslatedEvent, prepare};
use subproxy_types::{MessagesRequest, ProviderKey, ProxyError};

use crate::{AppState, error::ApiError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_BETA: &str = "oauth-2025-04-20,fine-grained-tool-streaming-2025-05-14";
const USER_AGENT: &str = "@anthropic-ai/sdk 1.2.12 node/22.13.1";

type UpstreamStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Handles `POST /v1/chat/completions` and `POST /v1/messages`.
pub async fn proxy_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<MessagesRequest>,
) -> Result<Response, ApiError> {
    orchestrate(&state, &headers, request)
        .await
        .map_err(ApiError::from)
}

async fn orchestrate(
    state: &AppState,
    headers: &HeaderMap,
    request: MessagesRequest,
) -> Result<Response, ProxyError> {
    let config = state.config.load_full();
    check_caller(headers, &config)?;

    let prepared = prepare(request);
    if let Some(bypass) = prepared.bypass {
        tracing::info!(model = %prepared.request.model, "answered capability probe locally");
        return Ok(Json(bypass).into_response());
    }

    let stream = prepared.request.stream;
    let disguised = prepared.disguised;
    tracing::info!(
        model = %prepared.request.model,
        stream,
        disguised,
        "proxying chat request"
    );

    let token = state
        .auth
        .get_access_token(&ProviderKey::anthropic())
        .await?
        .ok_or_else(|| ProxyError::TokenNotFound(ProviderKey::anthropic()))?;

    let body = prepared.request.to_body()?;
    let url = format!("{}/v1/messages", config.upstream.api_base.trim_end_matches('/'));
    let accept = if stream { "text/event-stream" } else { "application/json" };
    let request_timeout = Duration::from_secs(config.request_timeout_secs);

    let builder = state
        .http
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("anthropic-beta", ANTHROPIC_BETA)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header(header::USER_AGENT, USER_AGENT)
        .header(header::ACCEPT, accept)
        .json(&body);

    let resp = if stream {
        // a total timeout would also cap the body, so only bound the headers
        tokio::time::timeout(request_timeout, builder.send())
            .await
            .map_err(|_| ProxyError::Http(format!("no response from {url} within {request_timeout:?}")))??
    } else {
        builder.timeout(request_timeout).send().await?
    };

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %text, "upstream returned an error");
        return Err(if status == StatusCode::UNAUTHORIZED {
            ProxyError::UpstreamAuthExpired { body: text }
        } else {
            ProxyError::Upstream {
                status: status.as_u16(),
                body: text,
            }
        });
    }

    if stream {
        let idle = Duration::from_secs(config.stream_idle_timeout_secs);
        let translator = disguised.then(|| StreamTranslator::new(chrono::Utc::now().timestamp()));
        let mut headers = forwarded_headers(resp.headers(), &[
            header::CONTENT_ENCODING,
            header::CONTENT_LENGTH,
            header::TRANSFER_ENCODING,
        ]);
        if disguised {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        }
        let body = relay_body(resp.bytes_stream().boxed(), translator, idle);
        Ok(build_response(status, headers, body))
    } else {
        let mut headers = forwarded_headers(resp.headers(), &[
            header::CONTENT_ENCODING,
            header::CONTENT_LENGTH,
        ]);
        let bytes = resp.bytes().await?;
        let body = if disguised {
            let upstream: serde_json::Value = serde_json::from_slice(&bytes)?;
            let converted =
                AnthropicToOpenAI.translate_response(&upstream, chrono::Utc::now().timestamp());
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Body::from(serde_json::to_vec(&converted)?)
        } else {
            Body::from(bytes)
        };
        Ok(build_response(status, headers, body))
    }
}

/// Reject a caller that presents a secret other than the configured one.
///
/// Callers that send no secret are let through. A presented secret never
/// matches when no key (or an empty key) is configured.
fn check_caller(headers: &HeaderMap, config: &Config) -> Result<(), ProxyError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_whitespace().nth(1));
    let Some(secret) = presented else {
        return Ok(());
    };
    let expected = config.api_key.as_deref().filter(|k| !k.is_empty());
    if expected == Some(secret) {
        Ok(())
    } else {
        Err(ProxyError::Auth(
            "the presented API key does not match the configured key".into(),
        ))
    }
}

fn forwarded_headers(upstream: &HeaderMap, skip: &[header::HeaderName]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in upstream {
        if !skip.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}

struct Relay {
    upstream: UpstreamStream,
    translator: Option<StreamTranslator>,
    idle: Duration,
    done: bool,
}

/// Stream the upstream body to the caller, translating it when a translator
/// is given. Ends on upstream close, upstream error, or `idle` silence.
fn relay_body(upstream: UpstreamStream, translator: Option<StreamTranslator>, idle: Duration) -> Body {
    let relay = Relay {
        upstream,
        translator,
        idle,
        done: false,
    };
    let stream = futures_util::stream::unfold(relay, |mut r| async move {
        loop {
            if r.done {
                return None;
            }
            let chunk = match tokio::time::timeout(r.idle, r.upstream.next()).await {
                Err(_) => {
                    tracing::warn!(idle = ?r.idle, "upstream stream went idle, closing");
                    return None;
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "upstream stream failed, closing");
                    return None;
                }
                Ok(None) => {
                    r.done = true;
                    let tail = r
                        .translator
                        .as_mut()
                        .map(|t| encode(&t.finish()))
                        .unwrap_or_default();
                    if tail.is_empty() {
                        return None;
                    }
                    return Some((Ok::<_, std::io::Error>(tail), r));
                }
                Ok(Some(Ok(bytes))) => bytes,
            };
            let out = match r.translator.as_mut() {
                None => chunk,
                Some(t) => {
                    let out = encode(&t.feed(&chunk));
                    r.done = t.is_ended();
                    out
                }
            };
            if !out.is_empty() {
                return Some((Ok(out), r));
            }
        }
    });
    Body::from_stream(stream)
}

fn encode(events: &[TranslatedEvent]) -> Bytes {
    let mut buf = BytesMut::new();
    for ev in events {
        buf.extend_from_slice(&ev.to_sse_bytes());
    }
    buf.freeze()
}
