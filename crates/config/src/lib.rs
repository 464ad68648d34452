//! Configuration loading and hot-reloading for the subproxy server.
//!
//! Uses figment for YAML + environment configuration with sensible defaults,
//! and notify + arc-swap for live file watching.

pub mod paths;
pub mod schema;
pub mod watcher;

pub use schema::{Config, DEFAULT_OAUTH_CLIENT_ID, LogConfig, LogFormat, UpstreamConfig};
pub use watcher::ConfigWatcher;
