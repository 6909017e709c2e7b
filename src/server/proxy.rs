//! Upstream forwarding
//!
//! Every request that the auth middleware lets through is relayed to the
//! Basic-auth registry behind this service. Bodies are streamed in both
//! directions so large blob uploads and pulls never sit in memory.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, HeaderName, HeaderValue, Uri},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::ProxyError;

use super::middleware::ShimResponse;

/// Headers that only apply to a single connection
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Sends a request on to the registry and returns its response
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Forward `request` and produce the response to relay to the client
    async fn forward(&self, request: Request) -> Response;
}

/// Forwarder backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct UpstreamForwarder {
    client: reqwest::Client,
    base: Url,
}

impl UpstreamForwarder {
    /// Create a forwarder for the configured upstream
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProxyError> {
        let base = Url::parse(&config.url)
            .map_err(|e| ProxyError::InvalidUri(format!("{}: {}", config.url, e)))?;

        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder.build()?;

        Ok(Self::with_client(client, base))
    }

    /// Create a forwarder with a custom reqwest Client
    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    /// Upstream URL for a request URI
    ///
    /// The request path is appended to any base path of the upstream URL and
    /// the query string is carried over.
    pub fn target_url(&self, uri: &Uri) -> Url {
        let mut url = self.base.clone();
        let base_path = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", base_path, uri.path()));
        url.set_query(uri.query());
        url
    }

    async fn send(&self, request: Request) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let url = self.target_url(&parts.uri);

        let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
            || parts.headers.contains_key(header::TRANSFER_ENCODING);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, addr);
        }

        debug!(method = %parts.method, url = %url, "Forwarding request upstream");

        let mut upstream = self.client.request(parts.method, url).headers(headers);
        if has_body {
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let upstream = upstream.send().await?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

#[async_trait]
impl Forwarder for UpstreamForwarder {
    async fn forward(&self, request: Request) -> Response {
        match self.send(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Upstream request failed");
                ShimResponse::BadGateway.into_response()
            }
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: &SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{}, {}", prior, ip),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
