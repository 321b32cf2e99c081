//! Error types for stack operations.

use thiserror::Error;

use super::StackStatus;
use crate::signer::TransportError;

/// Errors raised while driving or observing a stack operation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StackError {
    /// The stack reached a failure terminal status.
    #[error("stack {stack_name} ended in {status}{}", reason_suffix(.reason.as_deref()))]
    DeploymentFailure {
        /// Stack being awaited.
        stack_name: String,
        /// Terminal status observed.
        status: StackStatus,
        /// Status reason reported by the control plane.
        reason: Option<String>,
    },
    /// Deletion failed and left resources behind.
    #[error(
        "stack {stack_name} could not be deleted{}; retry the deletion retaining the \
         resources that failed to delete (destroy --retain <LogicalId>)",
        reason_suffix(.reason.as_deref())
    )]
    DeleteFailed {
        /// Stack being deleted.
        stack_name: String,
        /// Status reason reported by the control plane.
        reason: Option<String>,
    },
    /// No terminal status was observed within the attempt budget.
    #[error("timed out waiting for stack {stack_name} after {attempts} status checks")]
    Timeout {
        /// Stack being awaited.
        stack_name: String,
        /// Number of status queries made.
        attempts: u32,
        /// Last status observed, if the stack was ever seen.
        last_status: Option<StackStatus>,
    },
    /// Waiting was cancelled by the caller.
    #[error("waiting for stack {stack_name} was cancelled after {attempts} status checks")]
    Cancelled {
        /// Stack being awaited.
        stack_name: String,
        /// Number of status queries completed before cancellation.
        attempts: u32,
    },
    /// The control plane answered with a payload that lacks expected fields.
    #[error("unexpected control plane response: {0}")]
    InvalidResponse(String),
    /// Transport or provider failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

fn reason_suffix(reason: Option<&str>) -> String {
    reason.map_or_else(String::new, |text| format!(": {text}"))
}
