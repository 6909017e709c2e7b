//! HTTP middleware for registry-auth-shim
//!
//! This module provides middleware for:
//! - The Docker token-auth handshake (challenge, token issuance, bearer rewrite)
//! - Request/response logging
//!
//! Only requests from registry clients, recognised by User-Agent prefix, are
//! touched. Everything else passes straight through to the upstream.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::auth::BearerCredential;

use super::router::AppState;

/// Path of the token issuance endpoint
pub const TOKEN_PATH: &str = "/docker-token";

const BASIC_PREFIX: &str = "Basic ";
const BEARER_PREFIX: &str = "Bearer ";

/// Body of a successful token response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub token: String,
}

/// Responses produced by the shim itself rather than the upstream
#[derive(Debug, Clone, PartialEq)]
pub enum ShimResponse {
    /// 200 with a token body
    Token(String),

    /// 401 Bearer challenge pointing at the token endpoint
    Challenge { realm: Arc<str> },

    /// 500 after a failed issuance
    IssueFailed,

    /// 502 after a failed upstream exchange
    BadGateway,

    /// 500 after a handler panic
    Internal,
}

impl IntoResponse for ShimResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Token(token) => (StatusCode::OK, Json(TokenResponse { token })).into_response(),
            Self::Challenge { realm } => {
                let challenge = format!("Bearer realm={}", quote_realm(&realm));
                match HeaderValue::from_str(&challenge) {
                    Ok(value) => (
                        StatusCode::UNAUTHORIZED,
                        [(header::WWW_AUTHENTICATE, value)],
                        status_text(StatusCode::UNAUTHORIZED),
                    )
                        .into_response(),
                    Err(e) => {
                        error!(error = %e, "Realm is not a valid header value");
                        error_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid realm")
                    }
                }
            }
            Self::IssueFailed => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to issue token")
            }
            Self::BadGateway => error_response(StatusCode::BAD_GATEWAY, "upstream unavailable"),
            Self::Internal => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({
        "error": message
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("")
}

/// Quote a realm for a `WWW-Authenticate` parameter
///
/// Backslashes and double quotes are escaped.
pub fn quote_realm(realm: &str) -> String {
    let mut quoted = String::with_capacity(realm.len() + 2);
    quoted.push('"');
    for c in realm.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Docker token-auth middleware
///
/// For registry clients this:
/// 1. Answers `/docker-token` itself, echoing a Basic credential or issuing
///    an anonymous token
/// 2. Challenges unauthenticated `/v2` probes with a Bearer realm
/// 3. Rewrites `Bearer` values on `/v2` paths: anonymous tokens are dropped,
///    anything else becomes a Basic credential for the upstream
pub async fn docker_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let from_client = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| state.auth.is_registry_client(ua));

    if !from_client {
        return next.run(request).await;
    }

    let path = request.uri().path();

    if path == TOKEN_PATH {
        return issue_token(&state, request.headers()).await.into_response();
    }

    let is_v2_root = path == "/v2" || path == "/v2/";
    let is_v2 = is_v2_root || path.starts_with("/v2/");

    let authorization = request.headers().get(header::AUTHORIZATION);
    let missing_auth = authorization.map_or(true, |v| v.is_empty());

    if is_v2_root && missing_auth {
        debug!("Challenging unauthenticated registry probe");
        return ShimResponse::Challenge {
            realm: Arc::clone(&state.realm),
        }
        .into_response();
    }

    if is_v2 {
        let bearer = authorization
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
            .map(|v| v.trim().to_string());

        if let Some(value) = bearer.filter(|v| !v.is_empty()) {
            rewrite_bearer(&state, request.headers_mut(), &value).await;
        }
    }

    next.run(request).await
}

async fn issue_token(state: &AppState, headers: &HeaderMap) -> ShimResponse {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BASIC_PREFIX))
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(credential) = basic {
        debug!("Echoing Basic credential as token");
        return ShimResponse::Token(credential.to_string());
    }

    match state.auth.issue_anonymous_token().await {
        Ok(token) => {
            debug!("Issued anonymous token");
            ShimResponse::Token(token)
        }
        Err(e) => {
            error!(error = %e, "Failed to issue anonymous token");
            ShimResponse::IssueFailed
        }
    }
}

async fn rewrite_bearer(state: &AppState, headers: &mut HeaderMap, value: &str) {
    match state.auth.classify(value).await {
        BearerCredential::Anonymous => {
            debug!("Anonymous token accepted, forwarding without credentials");
            headers.remove(header::AUTHORIZATION);
        }
        BearerCredential::Credential(credential) => {
            match HeaderValue::from_str(&format!("{}{}", BASIC_PREFIX, credential)) {
                Ok(basic) => {
                    headers.insert(header::AUTHORIZATION, basic);
                }
                Err(e) => debug!(error = %e, "Bearer value cannot be re-sent as Basic"),
            }
        }
    }
}

/// Logging middleware function
///
/// Logs request and response details including:
/// - Method and path
/// - Status code
/// - Response time
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );

    response
}
