//! Client key extraction for admission control.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};

use crate::config::KeyBy;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Peer IP without the port. Empty when the server did not record connection info.
pub fn key_by_remote_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

/// First hop of `X-Forwarded-For`, falling back to the peer IP.
///
/// Only meaningful behind a proxy that overwrites the header.
pub fn key_by_forwarded_for(request: &Request) -> String {
    request
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| key_by_remote_ip(request))
}

/// Extractor function for the configured strategy.
pub fn extractor_for(key_by: KeyBy) -> fn(&Request) -> String {
    match key_by {
        KeyBy::RemoteIp => key_by_remote_ip,
        KeyBy::ForwardedFor => key_by_forwarded_for,
    }
}
