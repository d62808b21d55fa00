//! Token bucket quota.
//!
//! Tokens refill continuously at `rate` per second up to `capacity`. Refill is
//! computed lazily whenever a token is requested, so an idle bucket costs
//! nothing.

use tokio::time::Instant;

/// A single token bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    rate: f64,
    last_update: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: u32, rate: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        Self {
            tokens: capacity,
            capacity,
            rate,
            last_update: now,
        }
    }

    /// Take one token if available after refilling up to `now`.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available at `now`, without consuming any.
    #[cfg(test)]
    pub fn available(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        (self.tokens + elapsed * self.rate).min(self.capacity)
    }

    fn refill(&mut self, now: Instant) {
        // A clock reading older than the last refill adds nothing.
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        if now > self.last_update {
            self.last_update = now;
        }
    }
}
