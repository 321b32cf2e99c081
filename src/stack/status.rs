//! Stack status vocabulary and terminal-state sets.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! stack_statuses {
    ($($variant:ident => $text:literal, $doc:literal;)*) => {
        /// Lifecycle status reported by the control plane for a stack.
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
        #[serde(from = "String", into = "String")]
        pub enum StackStatus {
            $(
                #[doc = $doc]
                $variant,
            )*
            /// A status this crate does not know, preserved verbatim.
            Other(String),
        }

        impl StackStatus {
            /// Wire representation of the status.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)*
                    Self::Other(raw) => raw,
                }
            }
        }

        impl From<&str> for StackStatus {
            fn from(value: &str) -> Self {
                match value {
                    $($text => Self::$variant,)*
                    other => Self::Other(other.to_owned()),
                }
            }
        }
    };
}

stack_statuses! {
    CreateInProgress => "CREATE_IN_PROGRESS", "Creation is running.";
    CreateFailed => "CREATE_FAILED", "Creation failed.";
    CreateComplete => "CREATE_COMPLETE", "Creation finished.";
    RollbackInProgress => "ROLLBACK_IN_PROGRESS", "A failed creation is being rolled back.";
    RollbackFailed => "ROLLBACK_FAILED", "Rolling back a failed creation failed.";
    RollbackComplete => "ROLLBACK_COMPLETE", "A failed creation was rolled back.";
    DeleteInProgress => "DELETE_IN_PROGRESS", "Deletion is running.";
    DeleteFailed => "DELETE_FAILED", "Deletion failed; some resources remain.";
    DeleteComplete => "DELETE_COMPLETE", "Deletion finished.";
    UpdateInProgress => "UPDATE_IN_PROGRESS", "An update is running.";
    UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS", "Old resources are being removed after an update.";
    UpdateComplete => "UPDATE_COMPLETE", "An update finished.";
    UpdateFailed => "UPDATE_FAILED", "An update failed.";
    UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS", "A failed update is being rolled back.";
    UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED", "Rolling back a failed update failed.";
    UpdateRollbackCompleteCleanupInProgress => "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS", "New resources are being removed after an update rollback.";
    UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE", "A failed update was rolled back.";
    ReviewInProgress => "REVIEW_IN_PROGRESS", "The stack exists only as a pending change set.";
    ImportInProgress => "IMPORT_IN_PROGRESS", "Resources are being imported.";
    ImportComplete => "IMPORT_COMPLETE", "An import finished.";
    ImportRollbackInProgress => "IMPORT_ROLLBACK_IN_PROGRESS", "A failed import is being rolled back.";
    ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED", "Rolling back a failed import failed.";
    ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE", "A failed import was rolled back.";
}

impl StackStatus {
    /// Returns `true` for statuses ending in `_FAILED` or
    /// `ROLLBACK_COMPLETE`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        let text = self.as_str();
        text.ends_with("_FAILED") || text.ends_with("ROLLBACK_COMPLETE")
    }

    /// Returns `true` while the control plane is still working on the stack.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }
}

impl From<String> for StackStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<StackStatus> for String {
    fn from(value: StackStatus) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation whose completion is being awaited.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OperationKind {
    /// Stack creation.
    Create,
    /// Stack update.
    Update,
    /// Stack deletion.
    Delete,
}

impl OperationKind {
    /// Status that ends the operation successfully.
    ///
    /// A deletion also succeeds when the stack can no longer be found.
    #[must_use]
    pub const fn success_status(self) -> StackStatus {
        match self {
            Self::Create => StackStatus::CreateComplete,
            Self::Update => StackStatus::UpdateComplete,
            Self::Delete => StackStatus::DeleteComplete,
        }
    }

    /// Returns `true` when `status` ends the operation successfully.
    #[must_use]
    pub fn is_success(self, status: &StackStatus) -> bool {
        *status == self.success_status()
    }

    /// Returns `true` when `status` ends the operation unsuccessfully.
    #[must_use]
    pub fn is_failure(self, status: &StackStatus) -> bool {
        status.is_failure() && !self.is_success(status)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}
