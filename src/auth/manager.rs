//! Authentication manager
//!
//! This module provides the authentication interface used by the HTTP layer.
//! It owns the token forge and the shared secret, and runs every Argon2
//! derivation on the blocking pool behind a concurrency bound. The permit for
//! a derivation travels into the blocking task, so it is held until the
//! derivation returns even when the requesting future is dropped.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::error::IssueError;

use super::bearer::{classify_bearer, BearerCredential};
use super::token::TokenForge;

/// Longest representable token lifetime
const MAX_TTL_SECS: i64 = i64::MAX / 1000;

/// Configuration for the authentication manager
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared secret the signing keys are derived from
    pub secret: String,

    /// Lifetime of issued anonymous tokens
    pub token_ttl: Duration,

    /// User-Agent prefixes identifying registry clients
    pub client_user_agents: Vec<String>,

    /// Maximum number of KDF runs in flight
    pub max_concurrent_kdf: usize,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("client_user_agents", &self.client_user_agents)
            .field("max_concurrent_kdf", &self.max_concurrent_kdf)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl: Duration::hours(1),
            client_user_agents: vec!["docker/".to_string()],
            max_concurrent_kdf: 4,
        }
    }
}

impl From<&crate::config::AuthConfig> for AuthConfig {
    fn from(config: &crate::config::AuthConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            token_ttl: Duration::seconds(
                i64::try_from(config.token_ttl_secs)
                    .unwrap_or(i64::MAX)
                    .min(MAX_TTL_SECS),
            ),
            client_user_agents: config.client_user_agents.clone(),
            max_concurrent_kdf: config.max_concurrent_kdf,
        }
    }
}

/// Authentication manager
///
/// Issues anonymous tokens and classifies presented bearer values.
pub struct AuthManager {
    forge: Arc<TokenForge>,
    secret: Arc<[u8]>,
    config: AuthConfig,
    kdf_permits: Arc<Semaphore>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("forge", &self.forge)
            .field("config", &self.config)
            .finish()
    }
}

impl AuthManager {
    /// Create a new authentication manager
    pub fn new(forge: Arc<TokenForge>, config: AuthConfig) -> Self {
        let secret: Arc<[u8]> = Arc::from(config.secret.as_bytes());
        let kdf_permits = Arc::new(Semaphore::new(config.max_concurrent_kdf.max(1)));
        Self {
            forge,
            secret,
            config,
            kdf_permits,
        }
    }

    /// Build a manager, and its forge, from the file configuration
    pub fn from_config(config: &crate::config::AuthConfig) -> Self {
        let forge = TokenForge::new(config.kdf.params(), config.limits);
        Self::new(Arc::new(forge), AuthConfig::from(config))
    }

    /// Lifetime of issued anonymous tokens
    pub fn token_ttl(&self) -> Duration {
        self.config.token_ttl
    }

    /// Check whether a User-Agent belongs to a registry client
    pub fn is_registry_client(&self, user_agent: &str) -> bool {
        self.config
            .client_user_agents
            .iter()
            .any(|prefix| user_agent.starts_with(prefix.as_str()))
    }

    /// Issue a fresh anonymous token
    pub async fn issue_anonymous_token(&self) -> Result<String, IssueError> {
        let permit = Arc::clone(&self.kdf_permits)
            .acquire_owned()
            .await
            .map_err(|e| IssueError::Worker(e.to_string()))?;

        let forge = Arc::clone(&self.forge);
        let secret = Arc::clone(&self.secret);
        let ttl = self.config.token_ttl;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            forge.issue(&secret, ttl)
        })
        .await
        .map_err(|e| IssueError::Worker(e.to_string()))?
    }

    /// Classify a non-empty, trimmed bearer value
    ///
    /// A worker failure cannot prove the value is an anonymous token, so the
    /// value is then treated as a credential.
    pub async fn classify(&self, value: &str) -> BearerCredential {
        let permit = match Arc::clone(&self.kdf_permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(error = %e, "KDF permits unavailable");
                return BearerCredential::Credential(value.to_string());
            }
        };

        let forge = Arc::clone(&self.forge);
        let secret = Arc::clone(&self.secret);
        let owned = value.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            classify_bearer(&forge, &secret, &owned)
        })
        .await;

        match result {
            Ok(credential) => credential,
            Err(e) => {
                error!(error = %e, "Bearer classification worker failed");
                BearerCredential::Credential(value.to_string())
            }
        }
    }
}
