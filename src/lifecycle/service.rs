//! The service loop contract.
//!
//! A service loop accepts and serves work until its drain token fires, then
//! finishes in-flight work and returns. Stopping because it was asked to is
//! reported as [`ServeError::Closed`], never as a transport failure.

use std::future::Future;
use std::io;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Listener-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// Terminal outcome of a service loop other than a clean return.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The loop stopped because its drain token fired.
    #[error("service loop closed on request")]
    Closed,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A long-running accept/serve loop driven by a lifecycle controller.
pub trait ServiceLoop: Send + 'static {
    /// Serve until `drain` is cancelled, then finish in-flight work and return.
    fn serve(
        self,
        drain: CancellationToken,
    ) -> impl Future<Output = Result<(), ServeError>> + Send + 'static;
}

impl<F, Fut> ServiceLoop for F
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ServeError>> + Send + 'static,
{
    fn serve(
        self,
        drain: CancellationToken,
    ) -> impl Future<Output = Result<(), ServeError>> + Send + 'static {
        self(drain)
    }
}
