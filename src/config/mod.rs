//! Configuration management for registry-auth-shim
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::token::KdfLimits;
use crate::auth::traits::KdfParams;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream registry configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Externally visible base URL of this service
    #[serde(default)]
    pub public_url: String,

    /// Token authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix AUTH_SHIM_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Server config from env
        if let Ok(host) = std::env::var("AUTH_SHIM_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("AUTH_SHIM_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }

        // Upstream and public addresses
        if let Ok(url) = std::env::var("AUTH_SHIM_UPSTREAM_URL") {
            config.upstream.url = url;
        }
        if let Ok(url) = std::env::var("AUTH_SHIM_PUBLIC_URL") {
            config.public_url = url;
        }

        // Auth config from env
        if let Ok(secret) = std::env::var("AUTH_SHIM_SECRET") {
            config.auth.secret = secret;
        }
        if let Ok(ttl) = std::env::var("AUTH_SHIM_TOKEN_TTL_SECS") {
            config.auth.token_ttl_secs = ttl
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid token TTL".to_string()))?;
        }

        if let Ok(origins) = std::env::var("AUTH_SHIM_CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        // Logging config from env
        if let Ok(level) = std::env::var("AUTH_SHIM_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("AUTH_SHIM_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Check the configuration for values the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "logging.level must be one of trace, debug, info, warn, error (got {:?})",
                    other
                )))
            }
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue(
                "server.port must not be 0".to_string(),
            ));
        }

        validate_http_url("upstream.url", &self.upstream.url)?;
        validate_http_url("public_url", &self.public_url)?;

        if self.auth.secret.is_empty() {
            return Err(ConfigError::MissingRequired("auth.secret".to_string()));
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.token_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.auth.client_user_agents.is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth.client_user_agents must not be empty".to_string(),
            ));
        }
        if self.auth.max_concurrent_kdf == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.max_concurrent_kdf must be greater than 0".to_string(),
            ));
        }

        let params = self.auth.kdf.params();
        argon2::Params::new(
            params.memory_cost_kib,
            params.time_cost,
            u32::from(params.parallelism),
            Some(crate::auth::traits::SIGNING_KEY_LEN),
        )
        .map_err(|e| ConfigError::InvalidValue(format!("auth.kdf: {}", e)))?;
        self.auth
            .limits
            .check(&params)
            .map_err(|e| ConfigError::InvalidValue(format!("auth.kdf: {}", e)))?;

        Ok(())
    }

    /// Realm advertised in `WWW-Authenticate` challenges
    pub fn token_realm(&self) -> String {
        format!("{}/docker-token", self.public_url.trim_end_matches('/'))
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingRequired(field.to_string()));
    }
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", field, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue(format!(
            "{}: scheme must be http or https",
            field
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidValue(format!("{}: missing host", field)));
    }
    Ok(())
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    3600 // large layer pulls
}

/// Upstream registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the Basic-auth registry
    #[serde(default)]
    pub url: String,

    /// Upstream request timeout in seconds (0 disables it)
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Token authentication configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Shared signing secret
    #[serde(default)]
    pub secret: String,

    /// Lifetime of anonymous tokens in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// User-Agent prefixes that identify registry clients
    #[serde(default = "default_client_user_agents")]
    pub client_user_agents: Vec<String>,

    /// Maximum concurrent Argon2 evaluations
    #[serde(default = "default_max_concurrent_kdf")]
    pub max_concurrent_kdf: usize,

    /// KDF costs stamped into new tokens
    #[serde(default)]
    pub kdf: KdfConfig,

    /// Ceiling on KDF costs accepted from presented tokens
    #[serde(default)]
    pub limits: KdfLimits,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("client_user_agents", &self.client_user_agents)
            .field("max_concurrent_kdf", &self.max_concurrent_kdf)
            .field("kdf", &self.kdf)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: default_token_ttl(),
            client_user_agents: default_client_user_agents(),
            max_concurrent_kdf: default_max_concurrent_kdf(),
            kdf: KdfConfig::default(),
            limits: KdfLimits::default(),
        }
    }
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_client_user_agents() -> Vec<String> {
    vec!["docker/".to_string()]
}

fn default_max_concurrent_kdf() -> usize {
    4
}

/// Argon2id cost configuration for newly issued tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KdfConfig {
    /// Number of passes
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,

    /// Memory size in KiB
    #[serde(default = "default_memory_cost_kib")]
    pub memory_cost_kib: u32,

    /// Lanes; defaults to the number of CPUs (capped at 255)
    #[serde(default)]
    pub parallelism: Option<u8>,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            time_cost: default_time_cost(),
            memory_cost_kib: default_memory_cost_kib(),
            parallelism: None,
        }
    }
}

impl KdfConfig {
    /// Resolve into concrete parameters
    pub fn params(&self) -> KdfParams {
        KdfParams {
            time_cost: self.time_cost,
            memory_cost_kib: self.memory_cost_kib,
            parallelism: self
                .parallelism
                .unwrap_or_else(KdfParams::default_parallelism),
        }
    }
}

fn default_time_cost() -> u32 {
    4
}

fn default_memory_cost_kib() -> u32 {
    64 * 1024
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorsConfig {
    /// Allowed origins; `*` and `scheme://*` act as wildcards
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["https://*".to_string(), "http://*".to_string()]
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax. Unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
