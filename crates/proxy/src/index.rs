//! Static login page.

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::AppState;

/// `GET /` and `GET /index.html`. The file is read on first success and
/// served from memory afterwards.
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    let path = state.config.load().static_dir.join("index.html");
    let html = state
        .index_html
        .get_or_try_init(|| async {
            let html = tokio::fs::read_to_string(&path).await?;
            tracing::debug!(path = %path.display(), "cached index page");
            Ok::<_, std::io::Error>(html)
        })
        .await;
    match html {
        Ok(html) => ([(header::CONTENT_TYPE, "text/html")], html.clone()).into_response(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "index page unavailable");
            (StatusCode::NOT_FOUND, "index.html not found").into_response()
        }
    }
}
