use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths;

pub use subproxy_types::provider::ANTHROPIC_OAUTH_CLIENT_ID as DEFAULT_OAUTH_CLIENT_ID;

/// Upstream endpoints. Overridable so tests can point at local mock servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the Messages API (`{api_base}/v1/messages`).
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// OAuth token endpoint used for refresh and code exchange. Read at
    /// startup only.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Model catalog consulted by `GET /v1/models`. Read at startup only.
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
}

fn default_api_base() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_token_url() -> String {
    "https://console.anthropic.com/v1/oauth/token".to_string()
}
fn default_catalog_url() -> String {
    "https://models.dev/api.json".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_url: default_token_url(),
            catalog_url: default_catalog_url(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration consumed by the binary's subscriber setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_port() -> u16 {
    9095
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}
fn default_client_id() -> String {
    DEFAULT_OAUTH_CLIENT_ID.to_string()
}
fn default_request_timeout() -> u64 {
    600
}
fn default_stream_idle_timeout() -> u64 {
    300
}

/// Top-level application configuration.
///
/// A reload through [`ConfigWatcher`](crate::ConfigWatcher) reaches every
/// request-scoped field (`api_key`, `upstream.api_base`, the timeouts,
/// `static_dir` until the page is first cached). Listener, logging,
/// credential location and fields documented as startup-only need a
/// restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 9095).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Secret callers must present as `Authorization: Bearer <key>` when they
    /// send one at all.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Credential file (defaults to `~/.claude-openai-proxy.json`).
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Directory holding `index.html`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// OAuth client id sent with authorization, refresh and code-exchange
    /// requests. Read at startup only.
    #[serde(default = "default_client_id")]
    pub oauth_client_id: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Optional outbound HTTP(S) proxy for all upstream calls. Read at
    /// startup only.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Upper bound on a non-streaming upstream call, and on connecting plus
    /// receiving response headers for a streaming one.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Maximum silence between two upstream stream chunks.
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            api_key: None,
            credentials_path: None,
            static_dir: default_static_dir(),
            oauth_client_id: default_client_id(),
            upstream: UpstreamConfig::default(),
            proxy_url: None,
            request_timeout_secs: default_request_timeout(),
            stream_idle_timeout_secs: default_stream_idle_timeout(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from defaults, an optional YAML file, and the
    /// environment, in increasing precedence.
    ///
    /// Environment sources: `SUBPROXY_*` (nested keys separated by `__`,
    /// e.g. `SUBPROXY_UPSTREAM__API_BASE`), plus `API_KEY`, `PORT` and
    /// `ANTHROPIC_OAUTH_CLIENT_ID`.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut fig = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            fig = fig.merge(Yaml::file(path));
        }
        fig.merge(Env::raw().only(&["api_key", "port"]))
            .merge(
                Env::raw()
                    .only(&["anthropic_oauth_client_id"])
                    .map(|_| "oauth_client_id".into()),
            )
            .merge(Env::prefixed("SUBPROXY_").split("__"))
            .extract()
    }

    /// Resolved credential file location.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(paths::default_credentials_path)
    }

    /// `host:port` listen address.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
