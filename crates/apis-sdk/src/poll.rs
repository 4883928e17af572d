//! User-triggered refresh with a bounded wait
//!
//! [`ManualRefresh`] runs a "refresh now" operation. Triggering it again
//! supersedes the running one: the old operation is cancelled and its late
//! result is discarded. A timeout is reported as its own state, separate
//! from a failure.

use crate::error::Result;
use crate::sanitize::sanitize;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State of a manual refresh, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState<T> {
    Idle,
    Running,
    Ready(T),
    TimedOut,
    Failed(String),
}

impl<T> RefreshState<T> {
    /// Retry is offered whenever nothing is running
    pub fn can_retry(&self) -> bool {
        !matches!(self, RefreshState::Running)
    }
}

/// What one call to [`ManualRefresh::run`] ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome<T> {
    Completed(T),
    TimedOut,
    Failed(String),
    /// A newer run replaced this one
    Superseded,
}

struct Inner<T> {
    state: RefreshState<T>,
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Coordinator for one kind of manual refresh
pub struct ManualRefresh<T> {
    timeout: Duration,
    inner: Mutex<Inner<T>>,
}

impl<T> std::fmt::Debug for ManualRefresh<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualRefresh")
            .field("timeout", &self.timeout)
            .field("generation", &self.inner.lock().generation)
            .finish()
    }
}

impl<T: Clone> ManualRefresh<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                generation: 0,
                cancel: None,
            }),
        }
    }

    pub fn state(&self) -> RefreshState<T> {
        self.inner.lock().state.clone()
    }

    /// Run `operation`, superseding any run in progress. The operation gets
    /// a token that fires when it is superseded or times out.
    pub async fn run<F, Fut>(&self, operation: F) -> RefreshOutcome<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            if let Some(previous) = inner.cancel.replace(token.clone()) {
                debug!("Superseding running refresh");
                previous.cancel();
            }
            inner.state = RefreshState::Running;
            inner.generation
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => RefreshOutcome::Superseded,
            result = tokio::time::timeout(self.timeout, operation(token.clone())) => match result {
                Err(_) => {
                    warn!("Refresh timed out after {:?}", self.timeout);
                    token.cancel();
                    RefreshOutcome::TimedOut
                }
                Ok(Ok(value)) => RefreshOutcome::Completed(value),
                Ok(Err(e)) => RefreshOutcome::Failed(sanitize(&e.to_string())),
            },
        };

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return RefreshOutcome::Superseded;
        }

        inner.cancel = None;
        inner.state = match &outcome {
            RefreshOutcome::Completed(value) => RefreshState::Ready(value.clone()),
            RefreshOutcome::TimedOut => RefreshState::TimedOut,
            RefreshOutcome::Failed(message) => RefreshState::Failed(message.clone()),
            RefreshOutcome::Superseded => RefreshState::Idle,
        };
        outcome
    }

    /// Abandon the running refresh, if any
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        if matches!(inner.state, RefreshState::Running) {
            inner.state = RefreshState::Idle;
        }
    }
}
