//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (403 for unlisted origins, preflight answered here)
//!     → gate.rs (admission check, 429 on deny)
//!         → keys.rs (derive client key)
//!         → rate_limit.rs (per-key quota, idle-key sweep)
//!             → token_bucket.rs (refill and consume)
//!     → handler
//!     → headers.rs (security response headers)
//! ```
//!
//! # Design Decisions
//! - Fail fast: admission never queues, it allows or rejects
//! - Fail closed: an unusable client key is a rejection
//! - Idle keys are forgotten to bound memory; a returning key gets a full bucket

pub mod cors;
pub mod gate;
pub mod headers;
pub mod keys;
pub mod rate_limit;
pub mod token_bucket;

pub use gate::admission_gate;
pub use rate_limit::{AdmissionError, AdmissionPolicy, PolicyError, RateLimiter};
