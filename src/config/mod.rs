// apm-intake configuration
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from APM_INTAKE_CONFIG env var
// 3. Config file contents from APM_INTAKE_CONFIG_CONTENT env var
// 4. Default config file locations (./apm-intake.toml, ./config.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub rum: RumConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub queue: QueueConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8200".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

/// Request handling and admission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Ceiling on decompressed body bytes per request.
    pub max_unzipped_size: u64,
    /// Size of the process-wide concurrency permit pool.
    pub concurrent_requests: usize,
    /// How long a request may wait for a concurrency permit.
    pub max_request_queue_time_ms: u64,
    /// Add client IP / user-agent to the metadata of each request.
    pub augment_enabled: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_unzipped_size: 30 * 1024 * 1024,
            concurrent_requests: 40,
            max_request_queue_time_ms: 2_000,
            augment_enabled: true,
        }
    }
}

impl RequestConfig {
    pub fn max_request_queue_time(&self) -> Duration {
        Duration::from_millis(self.max_request_queue_time_ms)
    }
}

/// Bearer token authentication. Unset or empty token disables the check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<String>,
}

impl AuthConfig {
    /// The configured token, treating an empty string as unset.
    pub fn token(&self) -> Option<&str> {
        self.secret_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Browser (real user monitoring) endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RumConfig {
    pub enabled: bool,
    /// Steady-state events per second per source IP. Burst is twice this.
    pub rate_limit: u32,
    /// Glob patterns matched against the `Origin` header.
    pub allow_origins: Vec<String>,
}

impl Default for RumConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_limit: 10,
            allow_origins: vec!["*".to_string()],
        }
    }
}

/// Legacy metrics endpoint switch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Publishing queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of batches buffered before submissions are rejected.
    pub capacity: usize,
    /// How long a submission may wait for queue space; 0 rejects immediately.
    pub processing_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            processing_timeout_ms: 0,
        }
    }
}

impl QueueConfig {
    pub fn processing_timeout(&self) -> Option<Duration> {
        match self.processing_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration with graceful fallback to defaults.
    /// Does not fail if config file is missing - uses defaults instead.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Parse TOML content into a config; missing sections take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.server = other.server;
        self.request = other.request;
        self.auth = other.auth;
        self.rum = other.rum;
        self.metrics = other.metrics;
        self.queue = other.queue;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
