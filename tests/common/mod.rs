//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use restgate::config::{AppConfig, KeyBy};
use tokio::net::TcpStream;

/// Config bound to `addr` with a tight limiter and short deadlines.
pub fn test_config(addr: SocketAddr, burst: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.http.bind_address = addr.to_string();
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 0.001;
    config.rate_limit.burst = burst;
    config.rate_limit.visitor_ttl_secs = 60;
    config.rate_limit.key_by = KeyBy::RemoteIp;
    config.shutdown.timeout_secs = 5;
    config
}

/// Wait until something accepts connections on `addr`.
pub async fn wait_for_listener(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on {addr}");
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
