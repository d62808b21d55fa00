//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events under per-component spans)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (JSON or console)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the trace layer
//! - Metrics are cheap and no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
