pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;

use crate::executor::request::{BoundedExecutor, ExecutorOptions};
use crate::helpers::time::system_clock;
use crate::token::jwt::encode_test_jwt;
use crate::token::manager::{TokenManager, TokenManagerOptions};
use crate::token::pair::TokenPair;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

/// Address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    listener.local_addr().unwrap()
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// JWT valid for another hour.
pub fn fresh_jwt() -> String {
    encode_test_jwt((Utc::now() + chrono::Duration::hours(1)).timestamp())
}

/// JWT that expired a minute ago.
pub fn expired_jwt() -> String {
    encode_test_jwt((Utc::now() - chrono::Duration::minutes(1)).timestamp())
}

pub fn token_manager(access_token: String, refresh_url: Option<String>) -> TokenManager {
    let options = TokenManagerOptions {
        refresh_url,
        expiry_buffer: chrono::Duration::minutes(5),
        request_timeout: Duration::from_secs(5),
    };
    TokenManager::new(
        build_reqwest_client(),
        TokenPair::new(access_token, "refresh-1"),
        options,
        system_clock(),
    )
}

/// Executor holding a fresh bearer token and no refresh endpoint.
pub fn executor(base_url: &str, timeout: Duration, max_response_bytes: usize) -> BoundedExecutor {
    BoundedExecutor::new(
        Client::new(),
        token_manager(fresh_jwt(), None),
        ExecutorOptions {
            base_url: base_url.to_owned(),
            timeout,
            max_response_bytes,
        },
    )
}
