//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use registry_auth_shim::config::{Config, UpstreamConfig};
use registry_auth_shim::server::{AppState, Server};

/// Secret shared by test servers
pub const TEST_SECRET: &str = "integration-test-secret";

/// A realistic Docker CLI User-Agent
pub const DOCKER_UA: &str =
    "docker/24.0.7 go/go1.21.3 git-commit/311b9ff kernel/6.5.0 os/linux arch/amd64";

/// Create a test configuration pointing at `upstream_url`
///
/// KDF costs are kept minimal so tests stay fast.
pub fn create_test_config(upstream_url: &str) -> Config {
    let mut config = Config {
        upstream: UpstreamConfig {
            url: upstream_url.to_string(),
            timeout_secs: 10,
        },
        public_url: "https://registry.example.com".to_string(),
        ..Config::default()
    };
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0; // Let OS assign a free port
    config.auth.secret = TEST_SECRET.to_string();
    config.auth.kdf.time_cost = 1;
    config.auth.kdf.memory_cost_kib = 64;
    config.auth.kdf.parallelism = Some(1);
    config
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    config: &Config,
) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let state = AppState::from_config(config).expect("Failed to build state");
    let server = Server::new(config.server.clone(), config.cors.clone(), state);

    tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}

/// A reqwest client that sends the Docker User-Agent
pub fn docker_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(DOCKER_UA)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build client")
}
