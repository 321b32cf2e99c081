//! Error types for template assembly.

use thiserror::Error;

/// Errors raised while assembling a template.
///
/// Every variant describes an invalid configuration: nothing here is
/// transient, so callers fix their input rather than retrying.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AssemblyError {
    /// Raised by `build()` when the dependency graph contains a cycle.
    #[error("circular dependency detected at {logical_id}: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// Resource at which the cycle was closed.
        logical_id: String,
        /// Resources along the cycle, starting and ending with `logical_id`.
        cycle: Vec<String>,
    },
    /// Raised when a logical ID is empty or not alphanumeric.
    #[error("invalid logical id '{logical_id}': only ASCII letters and digits are allowed")]
    InvalidLogicalId {
        /// Offending identifier.
        logical_id: String,
    },
    /// Raised when a resource type lacks a recognized namespace prefix.
    #[error("resource {logical_id} has unrecognized type '{resource_type}'")]
    UnknownNamespace {
        /// Resource being added.
        logical_id: String,
        /// Type supplied by the caller.
        resource_type: String,
    },
    /// Raised when a resource lists itself in `DependsOn`.
    #[error("resource {logical_id} depends on itself")]
    SelfDependency {
        /// Resource being added.
        logical_id: String,
    },
    /// Raised when properties are supplied as something other than an object.
    #[error("resource {logical_id} properties must be an object")]
    InvalidProperties {
        /// Resource being added.
        logical_id: String,
    },
    /// Raised by a contribution step that rejects its own feature config.
    #[error("contribution step '{step}' failed: {message}")]
    Step {
        /// Name of the failing step.
        step: String,
        /// Step-provided description.
        message: String,
    },
}
