//! HTTP service subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum::serve, graceful drain)
//!     → request id, tracing, timeout, body limit
//!     → in_flight.rs (count the request)
//!     → security headers
//!     → CORS origin check (when origins are configured)
//!     → admission gate (when rate limiting is enabled)
//!     → handlers.rs
//! ```

pub mod handlers;
pub mod in_flight;
pub mod server;

pub use in_flight::InFlightTracker;
pub use server::{build_router, HttpServer};
