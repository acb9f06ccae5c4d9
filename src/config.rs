use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::grant::{DEFAULT_TTL_SECS, MAX_TTL_SECS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5002".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Service root, e.g. `https://acme.search.windows.net`.
    pub endpoint: String,
    pub index: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Maximum hits per search.
    #[serde(default = "default_top")]
    pub top: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    "2023-11-01".to_string()
}
fn default_top() -> u32 {
    50
}
fn default_timeout_secs() -> u64 {
    30
}

/// How highlighted artifacts are named in the bucket.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactNaming {
    /// `highlighted_<name>`; each new query overwrites the previous artifact.
    #[default]
    PerDocument,
    /// `highlighted_<query fingerprint>_<name>`; one artifact per query.
    PerQuery,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3-compatible endpoint (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub artifact_naming: ArtifactNaming,
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_url_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub username: String,
    /// Environment variable holding the password.
    pub password_env: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate search
    if config.search.endpoint.trim().is_empty() {
        anyhow::bail!("search.endpoint must not be empty");
    }
    if config.search.index.trim().is_empty() {
        anyhow::bail!("search.index must not be empty");
    }
    if config.search.top == 0 {
        anyhow::bail!("search.top must be >= 1");
    }
    if config.search.timeout_secs == 0 {
        anyhow::bail!("search.timeout_secs must be >= 1");
    }

    // Validate storage
    if config.storage.bucket.trim().is_empty() {
        anyhow::bail!("storage.bucket must not be empty");
    }
    if !(1..=MAX_TTL_SECS).contains(&config.storage.url_ttl_secs) {
        anyhow::bail!("storage.url_ttl_secs must be in [1, {}]", MAX_TTL_SECS);
    }
    if let Some(ref endpoint) = config.storage.endpoint_url {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            anyhow::bail!("storage.endpoint_url must start with http:// or https://");
        }
    }

    // Validate auth
    let mut seen = std::collections::HashSet::new();
    for user in &config.auth.users {
        if user.username.is_empty() || user.username.contains(':') {
            anyhow::bail!("auth.users: invalid username '{}'", user.username);
        }
        if !seen.insert(user.username.as_str()) {
            anyhow::bail!("auth.users: duplicate username '{}'", user.username);
        }
    }

    Ok(config)
}
