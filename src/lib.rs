//! restgate: a rate-limited HTTP service with graceful lifecycle control.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ security::gate ──▶ http::handlers
//!                          │                 │
//!                          │                 ▼
//!                          │        security::rate_limit
//!                          │        (token bucket per key, TTL sweep)
//!                          ▼
//!               lifecycle::controller
//!               (start, drain on cancellation, deadline)
//!
//!     Cross-cutting: config, observability (tracing + metrics)
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::AppConfig;
pub use http::HttpServer;
pub use lifecycle::{LifecycleController, LifecycleError, ServiceLoop, ServiceState};
pub use security::{AdmissionPolicy, RateLimiter};
