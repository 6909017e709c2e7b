//! Transport-level layers
//!
//! Applied around the whole router, including the forwarding fallback:
//! - Request-Id generation and propagation (`x-request-id`)
//! - Request tracing spans (TraceLayer)
//! - CORS for browser clients
//! - Whole-request timeout
//! - Panic recovery (500)

use std::any::Any as PanicPayload;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{CorsConfig, ServerConfig};
use crate::server::middleware::ShimResponse;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Apply every transport layer to `router`
pub fn apply(router: Router, server: &ServerConfig, cors: &CorsConfig) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let router = router.layer(CatchPanicLayer::custom(panic_response));

    let router = if server.request_timeout_secs > 0 {
        router.layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
    } else {
        router
    };

    router
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

fn panic_response(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");
    ShimResponse::Internal.into_response()
}

/// Build the CORS policy from the configured origins
///
/// `*` allows any origin. An entry ending in `*` allows every origin with
/// that prefix, so `https://*` admits any HTTPS origin. Other entries must
/// match exactly.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE]);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let patterns = config.allowed_origins.clone();
    base.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _request| {
            origin
                .to_str()
                .map(|origin| origin_allowed(&patterns, origin))
                .unwrap_or(false)
        },
    ))
}

/// Check an origin against the configured patterns
pub fn origin_allowed(patterns: &[String], origin: &str) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => origin.starts_with(prefix) && origin.len() > prefix.len(),
        None => pattern == origin,
    })
}
