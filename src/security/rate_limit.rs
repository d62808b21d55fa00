//! Per-client admission control.
//!
//! Every client key owns a token bucket. Buckets live in a single map guarded
//! by one mutex; a background sweep task drops keys that have been idle for
//! longer than the configured TTL. A key that comes back after eviction starts
//! over with a full bucket.
//!
//! # Data Flow
//! ```text
//! request → key extractor → admit()
//!     → lock map → get or insert visitor → refresh last_seen
//!     → token bucket try_acquire → allow / deny
//!
//! sweep task (every max(ttl / 2, 1s)):
//!     → lock map → retain(last_seen >= now - ttl)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::Request;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::observability::metrics;
use crate::security::token_bucket::TokenBucket;

/// Lower bound for the sweep period, whatever the TTL.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Derives the client key from a request. An empty key is rejected.
pub type KeyExtractor<R> = Arc<dyn Fn(&R) -> String + Send + Sync>;

/// Invalid admission policy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("rate must be > 0 (got {0})")]
    InvalidRate(f64),
    #[error("burst must be > 0")]
    InvalidBurst,
    #[error("visitor ttl must be > 0")]
    InvalidTtl,
    #[error("key extractor is missing")]
    MissingKeyExtractor,
    #[error("no tokio runtime available to run the sweep task")]
    NoRuntime,
}

/// Reasons an admission check denies without consulting a bucket.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("bad client key")]
    BadKey,
    #[error("rate limiter is closed")]
    Closed,
}

/// Immutable limiter settings.
pub struct AdmissionPolicy<R: ?Sized = Request> {
    /// Sustained tokens per second.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// Idle time after which a key may be evicted.
    pub ttl: Duration,
    key_extractor: Option<KeyExtractor<R>>,
}

impl<R: ?Sized> AdmissionPolicy<R> {
    /// A policy without a key extractor; add one with [`Self::with_key_extractor`].
    pub fn new(rate: f64, burst: u32, ttl: Duration) -> Self {
        Self {
            rate,
            burst,
            ttl,
            key_extractor: None,
        }
    }

    pub fn with_key_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&R) -> String + Send + Sync + 'static,
    {
        self.key_extractor = Some(Arc::new(extractor));
        self
    }

    /// Check every field, reporting the first problem found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(PolicyError::InvalidRate(self.rate));
        }
        if self.burst == 0 {
            return Err(PolicyError::InvalidBurst);
        }
        if self.ttl.is_zero() {
            return Err(PolicyError::InvalidTtl);
        }
        if self.key_extractor.is_none() {
            return Err(PolicyError::MissingKeyExtractor);
        }
        Ok(())
    }

    /// `max(ttl / 2, 1s)`.
    pub fn sweep_interval(&self) -> Duration {
        (self.ttl / 2).max(MIN_SWEEP_INTERVAL)
    }
}

impl<R: ?Sized> Clone for AdmissionPolicy<R> {
    fn clone(&self) -> Self {
        Self {
            rate: self.rate,
            burst: self.burst,
            ttl: self.ttl,
            key_extractor: self.key_extractor.clone(),
        }
    }
}

impl<R: ?Sized> fmt::Debug for AdmissionPolicy<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPolicy")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("ttl", &self.ttl)
            .field("key_extractor", &self.key_extractor.is_some())
            .finish()
    }
}

struct Visitor {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// The visitor map shared between the limiter and its sweep task.
struct Visitors {
    map: Mutex<HashMap<String, Visitor>>,
    ttl: Duration,
}

impl Visitors {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Visitor>> {
        // Every mutation leaves the map consistent, so a poisoned lock is still usable.
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every visitor last seen before `now - ttl`. Holds the lock for the whole scan.
    fn evict_idle(&self, now: Instant) -> usize {
        let Some(cutoff) = now.checked_sub(self.ttl) else {
            return 0;
        };

        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, visitor| visitor.last_seen >= cutoff);
        let removed = before - map.len();

        metrics::record_visitors(map.len());
        if removed > 0 {
            metrics::record_evictions(removed);
        }
        removed
    }
}

/// Handle to the background sweep task.
struct Sweeper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Per-key token bucket rate limiter with idle-key eviction.
pub struct RateLimiter<R: ?Sized = Request> {
    visitors: Arc<Visitors>,
    rate: f64,
    burst: u32,
    sweep_interval: Duration,
    key_extractor: KeyExtractor<R>,
    closed: AtomicBool,
    sweeper: Mutex<Option<Sweeper>>,
    span: Span,
}

impl<R: ?Sized> RateLimiter<R> {
    /// Validate `policy` and spawn the sweep task on the current runtime.
    ///
    /// Log events are emitted under `span`.
    pub fn start(policy: AdmissionPolicy<R>, span: Span) -> Result<Self, PolicyError> {
        policy.validate()?;
        let runtime = Handle::try_current().map_err(|_| PolicyError::NoRuntime)?;
        let sweep_interval = policy.sweep_interval();
        let key_extractor = policy
            .key_extractor
            .ok_or(PolicyError::MissingKeyExtractor)?;

        let visitors = Arc::new(Visitors {
            map: Mutex::new(HashMap::new()),
            ttl: policy.ttl,
        });

        let token = CancellationToken::new();
        let first_tick = Instant::now() + sweep_interval;
        let handle = runtime.spawn(
            sweep_loop(Arc::clone(&visitors), first_tick, sweep_interval, token.clone())
                .instrument(span.clone()),
        );

        tracing::info!(
            parent: &span,
            rate = policy.rate,
            burst = policy.burst,
            ttl_secs = policy.ttl.as_secs_f64(),
            sweep_interval_secs = sweep_interval.as_secs_f64(),
            "Admission controller started"
        );

        Ok(Self {
            visitors,
            rate: policy.rate,
            burst: policy.burst,
            sweep_interval,
            key_extractor,
            closed: AtomicBool::new(false),
            sweeper: Mutex::new(Some(Sweeper { token, handle })),
            span,
        })
    }

    /// Decide whether `request` may proceed. Never waits on anything but the map lock.
    ///
    /// `Ok(false)` means the key is over its quota. Errors are denials too.
    pub fn admit(&self, request: &R) -> Result<bool, AdmissionError> {
        if self.closed.load(Ordering::Acquire) {
            metrics::record_admission("closed");
            return Err(AdmissionError::Closed);
        }

        let key = (self.key_extractor)(request);
        if key.is_empty() {
            tracing::debug!(parent: &self.span, "Request without a client key");
            metrics::record_admission("bad_key");
            return Err(AdmissionError::BadKey);
        }

        let now = Instant::now();
        let allowed = {
            let mut visitors = self.visitors.lock();
            // close() may have cleared the map between the first check and the lock.
            if self.closed.load(Ordering::Acquire) {
                metrics::record_admission("closed");
                return Err(AdmissionError::Closed);
            }
            match visitors.get_mut(&key) {
                Some(visitor) => {
                    visitor.last_seen = now;
                    visitor.bucket.try_acquire(now)
                }
                None => {
                    let mut bucket = TokenBucket::new(self.burst, self.rate, now);
                    let allowed = bucket.try_acquire(now);
                    visitors.insert(
                        key.clone(),
                        Visitor {
                            bucket,
                            last_seen: now,
                        },
                    );
                    metrics::record_visitors(visitors.len());
                    allowed
                }
            }
        };

        if allowed {
            metrics::record_admission("allowed");
        } else {
            tracing::warn!(parent: &self.span, client = %key, "Rate limit exceeded");
            metrics::record_admission("limited");
        }
        Ok(allowed)
    }

    /// [`Self::admit`] with every error treated as a denial.
    pub fn is_allowed(&self, request: &R) -> bool {
        self.admit(request).unwrap_or(false)
    }

    /// Run one sweep pass now. Returns how many keys were evicted.
    pub fn evict_stale(&self) -> usize {
        self.visitors.evict_idle(Instant::now())
    }

    /// Number of keys currently tracked.
    pub fn visitor_count(&self) -> usize {
        self.visitors.lock().len()
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop and join the sweep task, then drop all visitors.
    ///
    /// Safe to call more than once. Later admissions fail with
    /// [`AdmissionError::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(sweeper) = sweeper else {
            return;
        };

        sweeper.token.cancel();
        if let Err(e) = sweeper.handle.await {
            tracing::warn!(parent: &self.span, error = %e, "Sweep task ended abnormally");
        }

        self.visitors.lock().clear();
        metrics::record_visitors(0);
        tracing::info!(parent: &self.span, "Admission controller closed");
    }
}

impl<R: ?Sized> Drop for RateLimiter<R> {
    fn drop(&mut self) {
        let sweeper = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.token.cancel();
        }
    }
}

async fn sweep_loop(
    visitors: Arc<Visitors>,
    first_tick: Instant,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = time::interval_at(first_tick, period);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("Sweep task stopping");
                break;
            }
            _ = ticker.tick() => {
                let removed = visitors.evict_idle(Instant::now());
                if removed > 0 {
                    tracing::debug!(removed, "Evicted idle visitors");
                }
            }
        }
    }
}
