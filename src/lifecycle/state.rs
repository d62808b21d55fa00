//! Service state machine.
//!
//! # State Transitions
//! ```text
//! Idle → Running:          start
//! Running → Draining:      cancellation, drain begins
//! Running → Failed:        service loop died with a transport error
//! Running → Terminated:    service loop returned cleanly on its own
//! Draining → Terminated:   in-flight work finished or drain deadline passed
//! Failed → Terminated:     cleanup done
//! ```
//!
//! The current state is published through a watch channel so observers can
//! wait for a specific state instead of sleeping.

use std::fmt;

use tokio::sync::watch;

use crate::observability::metrics;

/// Lifecycle state of a service loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Terminated = 3,
    Failed = 4,
}

impl ServiceState {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_terminal(self) -> bool {
        self == ServiceState::Terminated
    }

    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Draining)
                | (Running, Failed)
                | (Running, Terminated)
                | (Draining, Terminated)
                | (Failed, Terminated)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Idle => "idle",
            ServiceState::Running => "running",
            ServiceState::Draining => "draining",
            ServiceState::Terminated => "terminated",
            ServiceState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Owner of the current [`ServiceState`].
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ServiceState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServiceState::Idle);
        Self { tx }
    }

    pub fn current(&self) -> ServiceState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.tx.subscribe()
    }

    /// Move to `next` if the transition is legal. Returns whether it happened.
    pub fn advance(&self, next: ServiceState) -> bool {
        let mut from = None;
        let applied = self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => {
                tracing::debug!(%from, to = %next, "Service state changed");
                metrics::record_service_state(next.code());
            }
            None => {
                tracing::debug!(current = %self.current(), to = %next, "Ignored state transition");
            }
        }
        applied
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
