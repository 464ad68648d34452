//! HTTP proxy layer: axum router, route handlers, and error mapping.
//!
//! Exposes an OpenAI-compatible `/v1/chat/completions` endpoint (also
//! reachable as `/v1/messages`) backed by the Anthropic Messages API, a
//! `/v1/models` listing, the `/auth/*` login endpoints and the static
//! login page.

mod auth_routes;
mod cors;
mod error;
mod index;
mod messages;
mod models;

pub use error::ApiError;
pub use models::{ModelCatalog, ModelEntry, ModelsDevCatalog};

use arc_swap::ArcSwap;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use subproxy_auth::{AuthFlow, AuthManager, CodePasteFlow};
use subproxy_config::Config;
use tokio::sync::OnceCell;
use tower_http::trace::TraceLayer;

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Server configuration. Atomically swappable for hot-reloading.
    pub config: Arc<ArcSwap<Config>>,
    /// Credential lifecycle for the upstream.
    pub auth: Arc<AuthManager>,
    /// HTTP client for upstream requests.
    pub http: reqwest::Client,
    /// Login collaborator behind `/auth/*`.
    pub auth_flow: Arc<dyn AuthFlow>,
    pub catalog: Arc<dyn ModelCatalog>,
    index_html: OnceCell<String>,
}

impl AppState {
    /// Creates a new shared application state wrapped in an `Arc`, with the
    /// bundled code-paste login flow and the `models.dev` catalog.
    pub fn new(config: Arc<ArcSwap<Config>>, auth: Arc<AuthManager>, http: reqwest::Client) -> Arc<Self> {
        let catalog_url = config.load().upstream.catalog_url.clone();
        Arc::new(Self {
            auth_flow: Arc::new(CodePasteFlow::new(Arc::clone(&auth))),
            catalog: Arc::new(ModelsDevCatalog::new(http.clone(), catalog_url)),
            config,
            auth,
            http,
            index_html: OnceCell::new(),
        })
    }
}

/// Build the upstream HTTP client, optionally routed through `proxy_url`.
///
/// # Errors
///
/// Returns [`ProxyError::Config`](subproxy_types::ProxyError::Config) if the
/// proxy URL is invalid or the client cannot be built.
pub fn build_http_client(proxy_url: Option<&str>) -> subproxy_types::traits::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(url) = proxy_url {
        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| subproxy_types::ProxyError::Config(format!("invalid proxy_url {url}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| subproxy_types::ProxyError::Config(format!("cannot build http client: {e}")))
}

/// Build the full axum router.
///
/// Routes:
/// - GET  /  and  /index.html           login page
/// - POST /v1/chat/completions          OpenAI-compatible
/// - POST /v1/messages                  same handler
/// - GET  /v1/models
/// - POST /auth/oauth/start
/// - POST /auth/oauth/callback
/// - POST /auth/login/start
/// - GET  /auth/logout
/// - GET  /auth/status
///
/// `OPTIONS` on any path answers 204 with CORS headers.
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index::index))
        .route("/index.html", get(index::index))
        .route("/v1/chat/completions", post(messages::proxy_messages))
        .route("/v1/messages", post(messages::proxy_messages))
        .route("/v1/models", get(models::list_models))
        .route("/auth/oauth/start", post(auth_routes::oauth_start))
        .route("/auth/oauth/callback", post(auth_routes::oauth_callback))
        .route("/auth/login/start", post(auth_routes::login_start))
        .route("/auth/logout", get(auth_routes::logout))
        .route("/auth/status", get(auth_routes::status))
        .with_state(state)
        .layer(middleware::from_fn(cors::cors))
        .layer(TraceLayer::new_for_http())
}
