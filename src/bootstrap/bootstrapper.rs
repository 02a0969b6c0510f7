//! Single-flight bootstrap orchestration

use super::retry::RetryPolicy;
use super::state::BootstrapState;
use crate::error::{BootstrapError, ConnectError, FailureClass};
use crate::health::HealthSignal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

/// Seam between the bootstrap loop and the concrete access channel.
///
/// One call is one complete connection attempt: open, authenticate, verify.
/// The implementation classifies each failure (transient vs fatal) so the
/// retry policy stays inspectable here rather than buried in channel code.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// The live connection produced by a successful attempt
    type Handle: Send + Sync + 'static;

    /// Perform one full connection attempt
    async fn connect(&self) -> Result<Self::Handle, ConnectError>;
}

struct Inner<H> {
    handle: Option<Arc<H>>,
    last_failure: Option<BootstrapError>,
}

/// Orchestrates the bootstrap sequence: state transitions, retry with
/// backoff, the overall deadline, and single-flight execution.
///
/// At most one connection sequence is in flight per bootstrapper; concurrent
/// `connect` callers suspend on the same attempt and observe its outcome.
/// Readiness probes read the state through [`HealthSignal`] without touching
/// the single-flight lock, so they stay answerable during backoff waits.
///
/// The bootstrapper is created at process start and dropped at process exit;
/// closing the handle it produced is the owner's responsibility.
pub struct Bootstrapper<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    deadline: Option<Duration>,
    state_tx: watch::Sender<BootstrapState>,
    inner: Mutex<Inner<C::Handle>>,
}

impl<C: Connector> Bootstrapper<C> {
    /// Create a bootstrapper with the default retry policy and no deadline
    pub fn new(connector: C) -> Self {
        let (state_tx, _) = watch::channel(BootstrapState::Uninitialized);
        Self {
            connector,
            policy: RetryPolicy::default(),
            deadline: None,
            state_tx,
            inner: Mutex::new(Inner {
                handle: None,
                last_failure: None,
            }),
        }
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set an overall deadline for each bootstrap sequence.
    ///
    /// Exceeding it forces `Failed` with [`BootstrapError::Timeout`]
    /// regardless of remaining retry budget.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Current bootstrap state
    pub fn current_state(&self) -> BootstrapState {
        *self.state_tx.borrow()
    }

    /// Readiness projection for the hosting platform's probes
    pub fn health_signal(&self) -> HealthSignal {
        HealthSignal::new(self.state_tx.subscribe())
    }

    /// Obtain the live connection, bootstrapping if necessary.
    ///
    /// * `Ready` with a stored handle: returns it immediately.
    /// * Another caller's bootstrap in flight: suspends on it and returns
    ///   that attempt's outcome, never a duplicate channel-open.
    /// * Otherwise (first call, or an explicit new attempt after `Failed`):
    ///   runs the full retry sequence.
    pub async fn connect(&self) -> Result<Arc<C::Handle>, BootstrapError> {
        // Snapshot before queuing on the lock: callers that arrive while a
        // sequence is in flight get that sequence's outcome
        let arrived_during = self.current_state() == BootstrapState::Connecting;

        let mut inner = self.inner.lock().await;

        if let Some(handle) = &inner.handle {
            return Ok(handle.clone());
        }
        if arrived_during {
            if let Some(failure) = &inner.last_failure {
                return Err(failure.clone());
            }
        }

        self.set_state(BootstrapState::Connecting);

        let started = std::time::Instant::now();
        let result = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, self.attempt_loop()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BootstrapError::Timeout { deadline }),
            },
            None => self.attempt_loop().await,
        };

        match result {
            Ok(handle) => {
                let handle = Arc::new(handle);
                inner.handle = Some(handle.clone());
                inner.last_failure = None;
                self.set_state(BootstrapState::Ready);
                crate::metrics::histograms::bootstrap_duration(
                    "ready",
                    started.elapsed().as_millis() as u64,
                );
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "bootstrap ready");
                Ok(handle)
            }
            Err(failure) => {
                inner.last_failure = Some(failure.clone());
                self.set_state(BootstrapState::Failed);
                crate::metrics::histograms::bootstrap_duration(
                    "failed",
                    started.elapsed().as_millis() as u64,
                );
                error!(error = %failure, "bootstrap failed");
                Err(failure)
            }
        }
    }

    /// Drop the stored handle and run a fresh bootstrap sequence.
    ///
    /// This is the explicit re-bootstrap for a handle that reported a fatal
    /// disconnect; the `Ready → Connecting` transition is observable on the
    /// health signal.
    pub async fn rebuild(&self) -> Result<Arc<C::Handle>, BootstrapError> {
        {
            let mut inner = self.inner.lock().await;
            inner.handle = None;
            inner.last_failure = None;
        }
        self.connect().await
    }

    /// The bounded retry loop with classified-failure dispatch
    async fn attempt_loop(&self) -> Result<C::Handle, BootstrapError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            crate::metrics::counters::connect_attempted();

            match self.connector.connect().await {
                Ok(handle) => {
                    if attempt > 1 {
                        info!(attempt, "connected after retry");
                    }
                    return Ok(handle);
                }
                Err(failure) => match failure.class() {
                    FailureClass::Fatal => {
                        crate::metrics::counters::connect_failed("fatal");
                        return Err(BootstrapError::Fatal(failure));
                    }
                    FailureClass::Transient if attempt >= max_attempts => {
                        crate::metrics::counters::connect_failed("retries_exhausted");
                        return Err(BootstrapError::RetriesExhausted {
                            attempts: attempt,
                            last: failure,
                        });
                    }
                    FailureClass::Transient => {
                        let delay = self.policy.next_delay(attempt - 1);
                        warn!(
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %failure,
                            "connection attempt failed, retrying"
                        );
                        crate::metrics::counters::connect_retried();
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }
    }

    fn set_state(&self, next: BootstrapState) {
        let current = self.current_state();
        if current == next {
            // A caller that cancelled mid-bootstrap leaves the state where it
            // was; re-entering the same state is a no-op, not a violation
            return;
        }
        if !current.can_transition_to(next) {
            // All transitions are driven from this file; an invalid one is a
            // logic bug worth surfacing loudly in logs
            error!(%current, %next, "invalid bootstrap state transition");
            return;
        }
        self.state_tx.send_replace(next);
    }
}
