//! OS signal handling.
//!
//! SIGINT and SIGTERM both request a graceful shutdown. A signal never stops
//! anything directly; it only cancels the token the controller is watching.

use std::future;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Resolve when SIGINT or SIGTERM arrives. Returns the signal name.
pub async fn shutdown_signal() -> &'static str {
    tokio::select! {
        _ = interrupt() => "SIGINT",
        _ = terminate() => "SIGTERM",
    }
}

/// Cancel `token` on the first shutdown signal.
///
/// The task also exits once `token` is cancelled by someone else, so it can
/// always be joined.
pub fn cancel_on_signal(token: CancellationToken, span: Span) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            tokio::select! {
                name = shutdown_signal() => {
                    tracing::info!(signal = name, "Shutdown signal received");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        }
        .instrument(span),
    )
}

async fn interrupt() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for SIGINT");
        future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGTERM");
            future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    future::pending::<()>().await;
}
