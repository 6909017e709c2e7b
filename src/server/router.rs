//! HTTP router for registry-auth-shim
//!
//! There are no routes of its own: every request falls back to the upstream
//! forwarder, and the auth middleware intercepts the handful of paths the
//! token handshake needs.

use axum::{
    extract::{Request, State},
    middleware,
    response::Response,
    Router,
};
use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::Config;

use super::middleware::{docker_auth_middleware, logging_middleware};
use super::proxy::{Forwarder, UpstreamForwarder};
use super::ServerError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Token issuance and bearer classification
    pub auth: Arc<AuthManager>,

    /// Relay to the upstream registry
    pub forwarder: Arc<dyn Forwarder>,

    /// Realm advertised in Bearer challenges
    pub realm: Arc<str>,
}

impl AppState {
    /// Wire the production collaborators from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let forwarder = UpstreamForwarder::new(&config.upstream)
            .map_err(|e| ServerError::Config(e.to_string()))?;

        Ok(Self {
            auth: Arc::new(AuthManager::from_config(&config.auth)),
            forwarder: Arc::new(forwarder),
            realm: Arc::from(config.token_realm()),
        })
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(forward_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            docker_auth_middleware,
        ))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Relay the request to the upstream registry
async fn forward_handler(State(state): State<AppState>, request: Request) -> Response {
    state.forwarder.forward(request).await
}
