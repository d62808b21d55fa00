//! Lifecycle controller.
//!
//! Runs a [`ServiceLoop`] in its own task and owns the decision of how that
//! task ends. Cancellation of the caller's token and an unprompted exit of
//! the loop race in a single `select!`; whichever wins decides the path, and
//! both paths finish by joining the task.
//!
//! # Shutdown Sequence
//! ```text
//! cancel token fires
//!     → state = Draining, drain token cancelled
//!     → wait for the loop, bounded by the deadline
//!     → on deadline: abort the task and reap it
//!     → state = Terminated
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::lifecycle::service::{ServeError, ServiceLoop, TransportError};
use crate::lifecycle::state::{ServiceState, StateMachine};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("service already started")]
    AlreadyStarted,
    #[error("service not started")]
    NotStarted,
    #[error("no tokio runtime available to run the service")]
    NoRuntime,
    #[error("graceful drain did not finish within {0:?}")]
    DrainTimeout(Duration),
    #[error(transparent)]
    Transport(TransportError),
    #[error("service task aborted: {0}")]
    TaskAborted(String),
}

type ServiceTask = JoinHandle<Result<(), ServeError>>;

enum Wake {
    Cancelled,
    Exited(Result<Result<(), ServeError>, JoinError>),
}

pub struct LifecycleController<S> {
    service: Option<S>,
    task: Option<ServiceTask>,
    drain: CancellationToken,
    state: StateMachine,
    span: Span,
}

impl<S: ServiceLoop> LifecycleController<S> {
    pub fn new(service: S, span: Span) -> Self {
        Self {
            service: Some(service),
            task: None,
            drain: CancellationToken::new(),
            state: StateMachine::new(),
            span,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state.current()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Spawn the service loop. Must be called from inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        if self.service.is_none() {
            return Err(LifecycleError::AlreadyStarted);
        }
        let runtime = Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;
        let service = self.service.take().ok_or(LifecycleError::AlreadyStarted)?;

        let serving = service.serve(self.drain.clone()).instrument(self.span.clone());
        self.task = Some(runtime.spawn(serving));
        self.state.advance(ServiceState::Running);
        tracing::info!(parent: &self.span, "Service started");
        Ok(())
    }

    /// Wait until `cancel` fires or the loop exits on its own.
    ///
    /// On cancellation the loop is drained within `shutdown_timeout`. An
    /// unprompted exit is reported as-is with no drain attempted.
    pub async fn run_until_cancelled(
        &mut self,
        cancel: &CancellationToken,
        shutdown_timeout: Duration,
    ) -> Result<(), LifecycleError> {
        let wake = match self.task.as_mut() {
            Some(task) => tokio::select! {
                biased;
                joined = task => Wake::Exited(joined),
                _ = cancel.cancelled() => Wake::Cancelled,
            },
            None if self.state.current() == ServiceState::Idle => {
                return Err(LifecycleError::NotStarted)
            }
            None => return Ok(()),
        };

        match wake {
            Wake::Cancelled => {
                tracing::info!(
                    parent: &self.span,
                    timeout_secs = shutdown_timeout.as_secs_f64(),
                    "Cancellation received, draining"
                );
                self.shutdown(shutdown_timeout).await
            }
            Wake::Exited(joined) => {
                self.task = None;
                self.finish_unprompted(joined)
            }
        }
    }

    /// Drain the loop and wait for it, bounded by `deadline`.
    ///
    /// Calling this again after the task has been joined is a no-op.
    pub async fn shutdown(&mut self, deadline: Duration) -> Result<(), LifecycleError> {
        let Some(mut task) = self.task.take() else {
            return match self.state.current() {
                ServiceState::Idle => Err(LifecycleError::NotStarted),
                _ => Ok(()),
            };
        };

        self.state.advance(ServiceState::Draining);
        self.drain.cancel();

        match time::timeout(deadline, &mut task).await {
            Ok(joined) => {
                let result = classify(joined);
                match &result {
                    Ok(()) => tracing::info!(parent: &self.span, "Service drained"),
                    Err(e) => tracing::error!(parent: &self.span, error = %e, "Service failed while draining"),
                }
                self.state.advance(ServiceState::Terminated);
                result
            }
            Err(_) => {
                tracing::warn!(
                    parent: &self.span,
                    deadline_secs = deadline.as_secs_f64(),
                    "Drain deadline exceeded, aborting service"
                );
                task.abort();
                if let Err(e) = task.await {
                    if e.is_panic() {
                        tracing::error!(parent: &self.span, error = %e, "Service panicked while aborting");
                    }
                }
                self.state.advance(ServiceState::Terminated);
                Err(LifecycleError::DrainTimeout(deadline))
            }
        }
    }

    fn finish_unprompted(
        &mut self,
        joined: Result<Result<(), ServeError>, JoinError>,
    ) -> Result<(), LifecycleError> {
        let result = classify(joined);
        match &result {
            Ok(()) => tracing::info!(parent: &self.span, "Service exited"),
            Err(e) => {
                tracing::error!(parent: &self.span, error = %e, "Service failed");
                self.state.advance(ServiceState::Failed);
            }
        }
        self.state.advance(ServiceState::Terminated);
        result
    }
}

impl<S> Drop for LifecycleController<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.drain.cancel();
            task.abort();
        }
    }
}

fn classify(joined: Result<Result<(), ServeError>, JoinError>) -> Result<(), LifecycleError> {
    match joined {
        Ok(Ok(())) | Ok(Err(ServeError::Closed)) => Ok(()),
        Ok(Err(ServeError::Transport(e))) => Err(LifecycleError::Transport(e)),
        Err(e) => Err(LifecycleError::TaskAborted(e.to_string())),
    }
}
