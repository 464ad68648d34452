use anyhow::{Context as _, Result};
use arc_swap::ArcSwap;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use subproxy_auth::AuthManager;
use subproxy_config::{Config, ConfigWatcher, LogConfig, LogFormat, paths};
use subproxy_proxy::AppState;
use subproxy_store::FileCredentialStore;
use subproxy_types::ProviderKey;

#[derive(Parser, Debug)]
#[command(
    name = "subproxy",
    version,
    about = "subproxy: OpenAI-compatible proxy for a Claude subscription"
)]
struct Cli {
    /// Path to the YAML configuration file (default: ~/.config/subproxy/config.yaml if present).
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Credential file (default: ~/.claude-openai-proxy.json).
    #[arg(long, value_name = "PATH", global = true)]
    credentials: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proxy server.
    Serve {
        /// Override the listening port (default: 9095).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },
    /// Show whether a usable credential is stored.
    Status,
    /// Remove the stored credential.
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| Some(paths::default_config_path()).filter(|p| p.exists()));

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(config_path, cli.credentials, port, host).await,
        Commands::Status => cmd_status(config_path, cli.credentials).await,
        Commands::Logout => cmd_logout(config_path, cli.credentials).await,
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    Config::load(path.map(PathBuf::as_path)).context("config error")
}

fn make_auth(config: &Config, credentials: Option<PathBuf>, http: reqwest::Client) -> AuthManager {
    let path = credentials.unwrap_or_else(|| config.credentials_path());
    tracing::debug!(path = %path.display(), "using credential file");
    AuthManager::new(Arc::new(FileCredentialStore::new(path)), http)
        .with_token_url(config.upstream.token_url.clone())
        .with_client_id(config.oauth_client_id.clone())
}

async fn cmd_serve(
    config_path: Option<PathBuf>,
    credentials: Option<PathBuf>,
    port: Option<u16>,
    host: Option<String>,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => {
            let watcher = Arc::new(ConfigWatcher::new(path.clone()).context("config error")?);
            let handle = watcher.arc();
            watcher.watch();
            handle
        }
        None => Arc::new(ArcSwap::from_pointee(load_config(None)?)),
    };
    let snapshot = config.load_full();
    init_tracing(&snapshot.log);

    let addr = Config {
        host: host.unwrap_or_else(|| snapshot.host.clone()),
        port: port.unwrap_or(snapshot.port),
        ..(*snapshot).clone()
    }
    .listen_addr();
    let http = subproxy_proxy::build_http_client(snapshot.proxy_url.as_deref())?;
    let auth = Arc::new(make_auth(&snapshot, credentials, http.clone()));
    if !auth.is_authenticated(&ProviderKey::anthropic()).await {
        tracing::warn!("no usable credential yet; open the login page to authenticate");
    }

    let app = subproxy_proxy::make_router(AppState::new(config, auth, http));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!(addr = %addr, "subproxy listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn cmd_status(config_path: Option<PathBuf>, credentials: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_ref())?;
    let auth = make_auth(&config, credentials, reqwest::Client::new());
    let status = if auth.is_authenticated(&ProviderKey::anthropic()).await {
        "authenticated"
    } else {
        "not authenticated"
    };
    println!("{}: {status}", ProviderKey::anthropic());
    Ok(())
}

async fn cmd_logout(config_path: Option<PathBuf>, credentials: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_ref())?;
    let auth = make_auth(&config, credentials, reqwest::Client::new());
    auth.remove_credential(&ProviderKey::anthropic())
        .await
        .context("logout failed")?;
    eprintln!("{} logged out", ProviderKey::anthropic());
    Ok(())
}
