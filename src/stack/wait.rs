//! Polling state machine that waits for a stack operation to finish.
//!
//! Each attempt queries the control plane once and classifies the
//! observation as finished, failed, or pending. Pending attempts sleep for
//! the fixed poll interval before the next query; the last attempt never
//! sleeps. Both the query and the sleep race the cancellation token.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ControlPlane, OperationKind, Stack, StackError, StackStatus};

/// Default delay between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default number of status queries before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;

/// Future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Source of delays between status queries.
pub trait Sleeper: Send + Sync {
    /// Completes after `duration` has elapsed.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// How a successful wait ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    /// The stack reached the success status of the operation.
    Reached(Stack),
    /// The stack no longer exists; only possible when deleting.
    Gone,
}

/// Classification of a single status observation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PollDecision {
    /// The operation finished successfully.
    Done(WaitOutcome),
    /// The operation reached a failure terminal.
    Fail(StackError),
    /// Keep polling.
    Continue,
}

/// Classifies one observation of `stack_name` while waiting for `kind`.
#[must_use]
pub fn classify(stack_name: &str, kind: OperationKind, observed: Option<&Stack>) -> PollDecision {
    let Some(stack) = observed else {
        return match kind {
            OperationKind::Delete => PollDecision::Done(WaitOutcome::Gone),
            OperationKind::Create | OperationKind::Update => PollDecision::Continue,
        };
    };
    if kind.is_success(&stack.status) {
        return PollDecision::Done(WaitOutcome::Reached(stack.clone()));
    }
    if stack.status == StackStatus::DeleteFailed {
        return PollDecision::Fail(StackError::DeleteFailed {
            stack_name: stack_name.to_owned(),
            reason: stack.status_reason.clone(),
        });
    }
    if kind.is_failure(&stack.status) {
        return PollDecision::Fail(StackError::DeploymentFailure {
            stack_name: stack_name.to_owned(),
            status: stack.status.clone(),
            reason: stack.status_reason.clone(),
        });
    }
    PollDecision::Continue
}

/// Waits for stack operations to reach a terminal status.
#[derive(Debug)]
pub struct StackWaiter<'a, C, S> {
    control_plane: &'a C,
    sleeper: &'a S,
    poll_interval: Duration,
    max_attempts: u32,
    cancel: CancellationToken,
}

impl<'a, C, S> StackWaiter<'a, C, S>
where
    C: ControlPlane,
    S: Sleeper,
{
    /// Creates a waiter with the default interval and attempt budget.
    #[must_use]
    pub fn new(control_plane: &'a C, sleeper: &'a S) -> Self {
        Self {
            control_plane,
            sleeper,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the delay between status queries.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the number of status queries; at least one is always made.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Stops waiting when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Polls `stack_name` until the operation `kind` finishes.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DeploymentFailure`] or
    /// [`StackError::DeleteFailed`] on a failure terminal,
    /// [`StackError::Timeout`] after `max_attempts` queries without a
    /// terminal status, [`StackError::Cancelled`] when the token fires, and
    /// any error raised by the control plane query.
    pub async fn wait_for(
        &self,
        stack_name: &str,
        kind: OperationKind,
    ) -> Result<WaitOutcome, StackError> {
        let mut last_status = None;
        for attempt in 1..=self.max_attempts {
            let completed = attempt - 1;
            if self.cancel.is_cancelled() {
                return Err(cancelled(stack_name, completed));
            }
            let observed = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(cancelled(stack_name, completed));
                }
                observed = self.control_plane.describe_stack(stack_name) => observed?,
            };

            match observed.as_ref() {
                Some(stack) => {
                    debug!(stack = stack_name, attempt, status = %stack.status, "stack status");
                    last_status = Some(stack.status.clone());
                }
                None if kind != OperationKind::Delete => {
                    warn!(stack = stack_name, attempt, "stack not visible yet");
                }
                None => {}
            }

            match classify(stack_name, kind, observed.as_ref()) {
                PollDecision::Done(outcome) => {
                    info!(stack = stack_name, %kind, attempts = attempt, "stack operation finished");
                    return Ok(outcome);
                }
                PollDecision::Fail(err) => return Err(err),
                PollDecision::Continue => {}
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        return Err(cancelled(stack_name, attempt));
                    }
                    () = self.sleeper.sleep(self.poll_interval) => {}
                }
            }
        }

        Err(StackError::Timeout {
            stack_name: stack_name.to_owned(),
            attempts: self.max_attempts,
            last_status,
        })
    }
}

fn cancelled(stack_name: &str, attempts: u32) -> StackError {
    info!(stack = stack_name, attempts, "wait cancelled");
    StackError::Cancelled {
        stack_name: stack_name.to_owned(),
        attempts,
    }
}
