//! Stack deployment state machine.
//!
//! A [`ControlPlane`] starts create, update, and delete operations; a
//! [`StackWaiter`] then polls the stack until the operation reaches a
//! terminal status, the attempt budget runs out, or the caller cancels.

mod control_plane;
mod error;
mod status;
mod wait;

use serde::{Deserialize, Serialize};

pub use control_plane::{
    CLOUDFORMATION_API_VERSION, CloudFormationControlPlane, ControlPlane, ControlPlaneFuture,
    DEFAULT_CAPABILITIES, StackRequest, UpdateOutcome,
};
pub use error::StackError;
pub use status::{OperationKind, StackStatus};
pub use wait::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, PollDecision, SleepFuture, Sleeper,
    StackWaiter, TokioSleeper, WaitOutcome, classify,
};

/// Snapshot of a stack as reported by the control plane.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct Stack {
    /// Stack name.
    pub name: String,
    /// Provider identifier, when known.
    pub stack_id: Option<String>,
    /// Current lifecycle status.
    pub status: StackStatus,
    /// Reason attached to the status, typically set on failures.
    pub status_reason: Option<String>,
    /// Outputs published by the stack.
    pub outputs: Vec<StackOutput>,
}

impl Stack {
    /// Creates a snapshot with no identifier, reason, or outputs.
    #[must_use]
    pub fn new(name: impl Into<String>, status: StackStatus) -> Self {
        Self {
            name: name.into(),
            stack_id: None,
            status,
            status_reason: None,
            outputs: Vec::new(),
        }
    }

    /// Attaches a status reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }

    /// Looks up an output value by key.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|output| output.key == key)
            .map(|output| output.value.as_str())
    }
}

/// A single stack output.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct StackOutput {
    /// Output key.
    pub key: String,
    /// Resolved value.
    pub value: String,
    /// Optional description.
    pub description: Option<String>,
    /// Export name, when the output is exported.
    pub export_name: Option<String>,
}

#[cfg(test)]
mod tests;
