//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → metrics → rate limiter → HTTP server → run
//!
//! Controller (controller.rs):
//!     start → run_until_cancelled → drain within deadline → Terminated
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → cancel the run token
//! ```
//!
//! # Design Decisions
//! - The service loop is a trait so any accept/serve loop can be driven
//! - State is published through a watch channel
//! - Shutdown has a deadline: the task is aborted and still joined after it

pub mod controller;
pub mod service;
pub mod signals;
pub mod startup;
pub mod state;

pub use controller::{LifecycleController, LifecycleError};
pub use service::{ServeError, ServiceLoop, TransportError};
pub use state::ServiceState;
