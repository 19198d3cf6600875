//! Configuration management for the relay
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Recognised variables:
//!
//! | Variable            | Setting                      |
//! |---------------------|------------------------------|
//! | `PORT`              | `server.port`                |
//! | `ELASTICSEARCH_URL` | `backend.url`                |
//! | `ALLOWED_INDICES`   | `access.allowed_indices`     |
//! | `RECORDS_INDEX`     | `records.index`              |
//! | `LOG_FORMAT`        | `observability.log_format`   |
//!
//! # Index allow-list
//!
//! `access.allowed_indices` restricts which indices `/search` may query.
//! **An empty list allows every index.** This is a development-mode escape
//! hatch and must not be relied on in production: free-text terms are handed
//! to the backend's query-string syntax unescaped, so the allow-list is the
//! only thing bounding what `/search` callers can read.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix every route is mounted under; data routes live below `<prefix>/v1`
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_path_prefix() -> String {
    "/api".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path_prefix: default_path_prefix(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Allowed origins. Use "*" for any origin.
    #[serde(default)]
    pub origins: Vec<String>,
}

/// Search backend connection settings
///
/// Timeouts are the only failure handling the relay applies to backend
/// calls; there are no retries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_backend_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    30000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AccessConfig {
    /// Indices `/search` may query. Empty allows all (development only).
    #[serde(default)]
    pub allowed_indices: Vec<String>,
}

impl AccessConfig {
    pub fn is_permissive(&self) -> bool {
        self.allowed_indices.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordsConfig {
    /// Index backing the `/records` routes
    #[serde(default = "default_records_index")]
    pub index: String,
}

fn default_records_index() -> String {
    "scholarship".to_string()
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            index: default_records_index(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("unknown log format '{other}' (expected 'pretty' or 'json')")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format. Override with LOG_FORMAT env var
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter string. Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Expose Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info,relay=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Split a comma-separated index list, dropping blanks
pub fn parse_index_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Load config from file path, falling back to defaults when it does not exist
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides; `lookup` is usually `std::env::var(..).ok()`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{port}'"))?;
        }
        if let Some(url) = lookup("ELASTICSEARCH_URL") {
            if !url.trim().is_empty() {
                self.backend.url = url.trim().to_string();
            }
        }
        if let Some(indices) = lookup("ALLOWED_INDICES") {
            self.access.allowed_indices = parse_index_list(&indices);
        }
        if let Some(index) = lookup("RECORDS_INDEX") {
            if !index.trim().is_empty() {
                self.records.index = index.trim().to_string();
            }
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.observability.log_format = format.parse()?;
        }
        Ok(())
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.backend.url)
            .with_context(|| format!("backend.url '{}' is not a valid URL", self.backend.url))?;
        if url.cannot_be_a_base() {
            bail!("backend.url '{}' cannot be used as a base URL", self.backend.url);
        }
        if !self.server.path_prefix.is_empty() && !self.server.path_prefix.starts_with('/') {
            bail!(
                "server.path_prefix must start with '/', got '{}'",
                self.server.path_prefix
            );
        }
        if self.records.index.trim().is_empty() {
            bail!("records.index must not be empty");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
