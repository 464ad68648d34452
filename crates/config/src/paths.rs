use std::path::PathBuf;

/// Return the user's home directory, falling back to the working directory.
#[must_use]
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from)
}

/// Default credential record, shared with other tools using the same layout.
#[must_use]
pub fn default_credentials_path() -> PathBuf {
    home_dir().join(".claude-openai-proxy.json")
}

/// Conventional location of the YAML configuration file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    home_dir()
        .join(".config")
        .join("subproxy")
        .join("config.yaml")
}
