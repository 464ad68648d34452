//! Models listing handler. Returns Anthropic models in `OpenAI` format.

use async_trait::async_trait;
use axum::{Json, extract::State};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use subproxy_types::{ProxyError, traits::Result};

use crate::{AppState, error::ApiError};

/// One entry of the `OpenAI` `/v1/models` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    /// Release date as unix seconds.
    pub created: i64,
    pub owned_by: &'static str,
}

/// Source of the model list.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Models newest first.
    async fn list_models(&self) -> Result<Vec<ModelEntry>>;
}

/// Catalog backed by the public `models.dev` registry.
pub struct ModelsDevCatalog {
    http: reqwest::Client,
    url: String,
}

impl ModelsDevCatalog {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ModelCatalog for ModelsDevCatalog {
    async fn list_models(&self) -> Result<Vec<ModelEntry>> {
        let resp = self
            .http
            .get(&self.url)
            .header("accept", "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let registry: Value = resp.json().await?;
        Ok(anthropic_models(&registry))
    }
}

/// Extract and sort the `anthropic` provider's models from a registry document.
fn anthropic_models(registry: &Value) -> Vec<ModelEntry> {
    let Some(models) = registry.pointer("/anthropic/models").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut entries: Vec<ModelEntry> = models
        .iter()
        .map(|(id, data)| ModelEntry {
            id: id.clone(),
            object: "model",
            created: release_timestamp(data.get("release_date").and_then(Value::as_str)),
            owned_by: "anthropic",
        })
        .collect();
    entries.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
    entries
}

/// `YYYY-MM-DD` (or `YYYY-MM`) at midnight UTC; unknown dates map to the epoch.
fn release_timestamp(date: Option<&str>) -> i64 {
    let Some(date) = date else { return 0 };
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{date}-01"), "%Y-%m-%d"))
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(0, |dt| dt.and_utc().timestamp())
}

/// Handles `GET /v1/models`.
pub async fn list_models(State(state): State<Arc<AppState>>) -> std::result::Result<Json<Value>, ApiError> {
    let data = state.catalog.list_models().await?;
    Ok(Json(json!({
        "object": "list",
        "data": data,
    })))
}
