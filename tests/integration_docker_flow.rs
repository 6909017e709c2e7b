//! Docker token-auth flow integration tests
//!
//! Drives the full server stack against a simulated upstream registry:
//! - Anonymous pull handshake (challenge, token, rewritten request)
//! - Credentialed pull and push (Basic echo and relay)
//! - Pass-through for non-registry clients

mod common;

use common::*;
use registry_auth_shim::auth::{KdfLimits, KdfParams, TokenForge};
use registry_auth_shim::server::TokenResponse;
use reqwest::StatusCode;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn no_authorization(request: &Request) -> bool {
    !request.headers.contains_key("authorization")
}

/// Test 1: Full anonymous pull handshake
#[tokio::test]
async fn test_anonymous_pull_flow() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/library/alpine/manifests/3.19"))
        .and(no_authorization)
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("docker-content-digest", "sha256:abc")
                .set_body_string("{\"schemaVersion\":2}"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let config = create_test_config(&upstream.uri());
    let (addr, _shutdown) = run_test_server(&config).await;
    let client = docker_client();

    // Probe is challenged
    let probe = client
        .get(format!("http://{}/v2/", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(probe.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        probe.headers().get("www-authenticate").unwrap(),
        "Bearer realm=\"https://registry.example.com/docker-token\""
    );

    // Token endpoint issues an anonymous token
    let token: TokenResponse = client
        .get(format!(
            "http://{}/docker-token?scope=repository:library/alpine:pull&service=registry",
            addr
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let forge = TokenForge::new(KdfParams::default(), KdfLimits::default());
    assert!(forge.verify(TEST_SECRET.as_bytes(), &token.token).is_ok());

    // Pull with the token reaches the upstream without credentials
    let manifest = client
        .get(format!("http://{}/v2/library/alpine/manifests/3.19", addr))
        .bearer_auth(&token.token)
        .send()
        .await
        .unwrap();
    assert_eq!(manifest.status(), StatusCode::OK);
    assert_eq!(
        manifest.headers().get("docker-content-digest").unwrap(),
        "sha256:abc"
    );
    assert_eq!(manifest.text().await.unwrap(), "{\"schemaVersion\":2}");
}

/// Test 2: Credentialed pull relays Basic credentials
#[tokio::test]
async fn test_credentialed_pull_flow() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/private/app/manifests/latest"))
        .and(header("authorization", "Basic dGVzdDp0ZXN0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("manifest"))
        .expect(1)
        .mount(&upstream)
        .await;

    let config = create_test_config(&upstream.uri());
    let (addr, _shutdown) = run_test_server(&config).await;
    let client = docker_client();

    let token: TokenResponse = client
        .get(format!("http://{}/docker-token", addr))
        .basic_auth("test", Some("test"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(token.token, "dGVzdDp0ZXN0");

    let response = client
        .get(format!("http://{}/v2/private/app/manifests/latest", addr))
        .bearer_auth(&token.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "manifest");
}

/// Test 3: Upstream rejection of bad credentials is relayed unchanged
#[tokio::test]
async fn test_bad_credentials_relayed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/private/app/manifests/latest"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("www-authenticate", "Basic realm=\"zot\"")
                .set_body_string("{\"errors\":[{\"code\":\"UNAUTHORIZED\"}]}"),
        )
        .mount(&upstream)
        .await;

    let config = create_test_config(&upstream.uri());
    let (addr, _shutdown) = run_test_server(&config).await;

    let response = docker_client()
        .get(format!("http://{}/v2/private/app/manifests/latest", addr))
        .bearer_auth("d3Jvbmc6d3Jvbmc=")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Basic realm=\"zot\""
    );
}

/// Test 4: Blob upload bodies stream through with credentials rewritten
#[tokio::test]
async fn test_push_blob_upload() {
    let blob = vec![7u8; 256 * 1024];

    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/private/app/blobs/uploads/session-1"))
        .and(header("authorization", "Basic dGVzdDp0ZXN0"))
        .and(body_bytes(blob.clone()))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("location", "/v2/private/app/blobs/sha256:def"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let config = create_test_config(&upstream.uri());
    let (addr, _shutdown) = run_test_server(&config).await;

    let response = docker_client()
        .put(format!(
            "http://{}/v2/private/app/blobs/uploads/session-1?digest=sha256:def",
            addr
        ))
        .bearer_auth("dGVzdDp0ZXN0")
        .header("content-type", "application/octet-stream")
        .body(blob)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "/v2/private/app/blobs/sha256:def"
    );
}

/// Test 5: Non-registry clients reach the upstream untouched
#[tokio::test]
async fn test_browser_client_passthrough() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .and(no_authorization)
        .respond_with(ResponseTemplate::new(401).set_body_string("upstream says no"))
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/docker-token"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&upstream)
        .await;

    let config = create_test_config(&upstream.uri());
    let (addr, _shutdown) = run_test_server(&config).await;
    let client = reqwest::Client::builder()
        .user_agent("Mozilla/5.0")
        .build()
        .unwrap();

    let response = client
        .get(format!("http://{}/v2/", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("www-authenticate").is_none());
    assert_eq!(response.text().await.unwrap(), "upstream says no");

    let response = client
        .get(format!("http://{}/docker-token", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Test 6: Forwarded requests carry the client address
#[tokio::test]
async fn test_forwarded_for_header() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/_catalog"))
        .and(header("x-forwarded-for", "127.0.0.1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let config = create_test_config(&upstream.uri());
    let (addr, _shutdown) = run_test_server(&config).await;

    let response = docker_client()
        .get(format!("http://{}/v2/_catalog", addr))
        .basic_auth("test", Some("test"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test 7: Responses carry a request id
#[tokio::test]
async fn test_request_id_on_responses() {
    let upstream = MockServer::start().await;
    let config = create_test_config(&upstream.uri());
    let (addr, _shutdown) = run_test_server(&config).await;

    let response = docker_client()
        .get(format!("http://{}/v2", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-request-id"));

    let response = docker_client()
        .get(format!("http://{}/docker-token", addr))
        .header("x-request-id", "pull-123")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "pull-123");
}

/// Test 8: An unreachable upstream yields 502 to the client
#[tokio::test]
async fn test_unreachable_upstream() {
    let parked = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = format!("http://{}", parked.local_addr().unwrap());
    drop(parked);

    let config = create_test_config(&dead);
    let (addr, _shutdown) = run_test_server(&config).await;

    let response = docker_client()
        .get(format!("http://{}/v2/app/tags/list", addr))
        .bearer_auth("dGVzdDp0ZXN0")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.headers().get("x-request-id").is_some());
}
