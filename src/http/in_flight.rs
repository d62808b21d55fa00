//! In-flight request tracking.
//!
//! Every request served by the router holds an [`InFlightGuard`] for its
//! lifetime. The count is what a graceful drain is waiting on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::observability::metrics;

/// Shared counter of requests currently being served.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    count: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. The returned guard decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        let now = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_in_flight(now);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_in_flight(now);
    }
}

/// Middleware holding a guard while the inner service runs.
pub async fn track_in_flight(
    State(tracker): State<InFlightTracker>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = tracker.track();
    next.run(request).await
}
