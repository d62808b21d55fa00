//! Startup orchestration.
//!
//! # Order
//! ```text
//! metrics exporter (optional)
//!     → rate limiter (sweep task starts)
//!     → HTTP server under a lifecycle controller
//!     → signal watcher
//!     → run until cancelled or the server exits
//!     → close the rate limiter
//! ```
//!
//! Any startup error is fatal. The limiter is closed on every path once it
//! has been started.

use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info_span;

use crate::config::{AppConfig, ConfigError};
use crate::http::HttpServer;
use crate::lifecycle::controller::{LifecycleController, LifecycleError};
use crate::lifecycle::signals;
use crate::observability::logging::LoggingError;
use crate::observability::metrics;
use crate::security::rate_limit::{PolicyError, RateLimiter};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("invalid metrics address: {0}")]
    MetricsAddress(#[from] AddrParseError),
    #[error("metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("rate limiter error: {0}")]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Run the service until a shutdown signal arrives or the server exits.
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    let cancel = CancellationToken::new();
    let watcher = signals::cancel_on_signal(cancel.clone(), info_span!("signals"));

    let result = run_until(config, cancel.clone()).await;

    cancel.cancel();
    let _ = watcher.await;
    result
}

/// [`run`] driven by `cancel` instead of OS signals.
pub async fn run_until(config: AppConfig, cancel: CancellationToken) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let limiter = if config.rate_limit.enabled {
        let limiter = RateLimiter::start(config.rate_limit.policy(), info_span!("admission"))?;
        tracing::info!(
            requests_per_second = config.rate_limit.requests_per_second,
            burst = config.rate_limit.burst,
            visitor_ttl_secs = config.rate_limit.visitor_ttl_secs,
            key_by = ?config.rate_limit.key_by,
            "Rate limiting enabled"
        );
        Some(Arc::new(limiter))
    } else {
        tracing::warn!("Rate limiting disabled");
        None
    };

    let server = HttpServer::new(&config, limiter.clone(), info_span!("http"));
    let mut controller = LifecycleController::new(server, info_span!("lifecycle"));

    let result = match controller.start() {
        Ok(()) => {
            controller
                .run_until_cancelled(&cancel, config.shutdown.timeout())
                .await
        }
        Err(e) => Err(e),
    };

    if let Some(limiter) = limiter {
        limiter.close().await;
    }

    tracing::info!(state = %controller.state(), "Shutdown complete");
    result.map_err(StartupError::from)
}
