//! Orchestrates stack deployments end to end.
//!
//! A deployment validates the template, diffs it against the previously
//! deployed revision, refuses destructive changes unless they are allowed,
//! creates or updates the stack, and waits for the operation to settle.
//! Destroying a stack deletes it and waits for the deletion to finish.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::differ::{self, DeploymentStrategy, TemplateDiff};
use crate::stack::{
    ControlPlane, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, OperationKind, Sleeper, Stack,
    StackError, StackRequest, StackStatus, StackWaiter, UpdateOutcome, WaitOutcome,
};
use crate::template::{Template, TemplateError};

/// Errors surfaced while deploying or destroying a stack.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The template is invalid or cannot be serialized.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    /// The change would delete or replace resources and destructive changes
    /// were not allowed.
    #[error(
        "refusing to deploy {stack_name}: the change would delete or replace {}; \
         re-run with destructive changes allowed to proceed",
        .resources.join(", ")
    )]
    DestructiveChange {
        /// Stack being deployed.
        stack_name: String,
        /// Logical IDs that would be deleted or replaced.
        resources: Vec<String>,
    },
    /// The stack never finished its first creation and can only be deleted.
    #[error(
        "stack {stack_name} is {status} after a failed creation and cannot be updated; \
         run `stratus destroy {stack_name}` and deploy again"
    )]
    FailedCreation {
        /// Stack being deployed.
        stack_name: String,
        /// Status that blocks the update.
        status: StackStatus,
    },
    /// The control plane or the wait failed.
    #[error(transparent)]
    Stack(#[from] StackError),
}

/// What a deployment did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeployAction {
    /// A new stack was created.
    Created,
    /// An existing stack was updated.
    Updated,
    /// Nothing needed to change.
    Unchanged,
}

/// Result of [`DeployOrchestrator::deploy`].
#[derive(Clone, Debug, PartialEq)]
pub struct DeployReport {
    /// What the deployment did.
    pub action: DeployAction,
    /// Strategy derived from the diff.
    pub strategy: DeploymentStrategy,
    /// Diff against the previous revision.
    pub diff: TemplateDiff,
    /// Final stack snapshot, when the stack exists.
    pub stack: Option<Stack>,
}

/// Per-deployment options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeployOptions {
    previous: Option<Template>,
    parameters: Vec<(String, String)>,
    tags: Vec<(String, String)>,
    allow_destructive: bool,
}

impl DeployOptions {
    /// Creates default options: no previous template, no destructive changes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs against `template` instead of fetching the deployed revision.
    #[must_use]
    pub fn previous(mut self, template: Template) -> Self {
        self.previous = Some(template);
        self
    }

    /// Passes a template parameter value.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    /// Tags the stack.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Allows changes that delete or replace resources.
    #[must_use]
    pub const fn allow_destructive(mut self, allow: bool) -> Self {
        self.allow_destructive = allow;
        self
    }
}

/// Deploys and destroys stacks through a [`ControlPlane`].
#[derive(Debug)]
pub struct DeployOrchestrator<C, S> {
    control_plane: C,
    sleeper: S,
    poll_interval: Duration,
    max_attempts: u32,
    cancel: CancellationToken,
}

impl<C, S> DeployOrchestrator<C, S>
where
    C: ControlPlane,
    S: Sleeper,
{
    /// Creates an orchestrator with the default polling settings.
    #[must_use]
    pub fn new(control_plane: C, sleeper: S) -> Self {
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

    /// Overrides the number of status queries per wait.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Cancels in-flight waits when `token` fires.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Control plane used by this orchestrator.
    #[must_use]
    pub const fn control_plane(&self) -> &C {
        &self.control_plane
    }

    fn waiter(&self) -> StackWaiter<'_, C, S> {
        StackWaiter::new(&self.control_plane, &self.sleeper)
            .with_poll_interval(self.poll_interval)
            .with_max_attempts(self.max_attempts)
            .with_cancellation(self.cancel.clone())
    }

    /// Returns the current state of `stack_name`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Stack`] when the query fails.
    pub async fn status(&self, stack_name: &str) -> Result<Option<Stack>, DeployError> {
        Ok(self.control_plane.describe_stack(stack_name).await?)
    }

    /// Deploys `template` as `stack_name`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Template`] when the template references
    /// unknown names, [`DeployError::DestructiveChange`] when the change
    /// deletes or replaces resources without permission,
    /// [`DeployError::FailedCreation`] when an earlier creation left the stack
    /// rolled back, and [`DeployError::Stack`] when the control plane or the wait fails.
    pub async fn deploy(
        &self,
        stack_name: &str,
        template: &Template,
        options: &DeployOptions,
    ) -> Result<DeployReport, DeployError> {
        template.validate_references()?;

        let existing = self.control_plane.describe_stack(stack_name).await?;
        if let Some(stack) = existing.as_ref().filter(|stack| {
            matches!(
                stack.status,
                StackStatus::RollbackComplete | StackStatus::RollbackFailed
            )
        }) {
            return Err(DeployError::FailedCreation {
                stack_name: stack_name.to_owned(),
                status: stack.status.clone(),
            });
        }
        let previous = match (&options.previous, &existing) {
            (Some(supplied), _) => Some(supplied.clone()),
            (None, Some(_)) => self.deployed_template(stack_name).await?,
            (None, None) => None,
        };
        let baseline = previous.unwrap_or_default();
        let diff = differ::diff(&baseline, template);
        let strategy = diff.strategy();
        info!(stack = stack_name, %strategy, "computed deployment strategy");

        if strategy == DeploymentStrategy::Skip && existing.is_some() {
            if options.parameters.is_empty()
                && options.tags.is_empty()
                && sections_match(&baseline, template)
            {
                return Ok(DeployReport {
                    action: DeployAction::Unchanged,
                    strategy,
                    diff,
                    stack: existing,
                });
            }
            debug!(
                stack = stack_name,
                "resources unchanged; submitting update for other template sections or stack settings"
            );
        }

        if differ::requires_replacement(&diff, &baseline, template) {
            let mut affected = diff.deleted.clone();
            affected.extend(
                differ::replacements(&diff, &baseline, template)
                    .into_iter()
                    .map(|replacement| replacement.logical_id),
            );
            let resources: Vec<String> = affected.into_iter().collect();
            if !options.allow_destructive {
                return Err(DeployError::DestructiveChange {
                    stack_name: stack_name.to_owned(),
                    resources,
                });
            }
            warn!(stack = stack_name, resources = ?resources, "applying destructive change");
        }

        let mut request = StackRequest::from_template(stack_name, template)?;
        request.parameters.clone_from(&options.parameters);
        request.tags.clone_from(&options.tags);

        let (action, kind) = if existing.is_some() {
            match self.control_plane.update_stack(&request).await? {
                UpdateOutcome::Started => (DeployAction::Updated, OperationKind::Update),
                UpdateOutcome::NoChanges => {
                    return Ok(DeployReport {
                        action: DeployAction::Unchanged,
                        strategy,
                        diff,
                        stack: existing,
                    });
                }
            }
        } else {
            let stack_id = self.control_plane.create_stack(&request).await?;
            info!(stack = stack_name, stack_id = %stack_id, "stack creation started");
            (DeployAction::Created, OperationKind::Create)
        };

        let stack = match self.waiter().wait_for(stack_name, kind).await? {
            WaitOutcome::Reached(stack) => Some(stack),
            WaitOutcome::Gone => None,
        };
        info!(stack = stack_name, ?action, "deployment finished");
        Ok(DeployReport {
            action,
            strategy,
            diff,
            stack,
        })
    }

    /// Deletes `stack_name`, retaining the physical resources of `retain`,
    /// and waits for the deletion to finish.
    ///
    /// Returns `false` when the stack did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Stack`] when the deletion fails, including
    /// [`StackError::DeleteFailed`] when resources could not be removed.
    pub async fn destroy(&self, stack_name: &str, retain: &[String]) -> Result<bool, DeployError> {
        if self.control_plane.describe_stack(stack_name).await?.is_none() {
            info!(stack = stack_name, "stack already absent");
            return Ok(false);
        }
        self.control_plane.delete_stack(stack_name, retain).await?;
        self.waiter()
            .wait_for(stack_name, OperationKind::Delete)
            .await?;
        info!(stack = stack_name, "stack deleted");
        Ok(true)
    }

    async fn deployed_template(&self, stack_name: &str) -> Result<Option<Template>, DeployError> {
        let Some(body) = self.control_plane.get_template(stack_name).await? else {
            return Ok(None);
        };
        match Template::from_json_str(&body) {
            Ok(template) => Ok(Some(template)),
            Err(err) => {
                warn!(stack = stack_name, error = %err, "deployed template is not JSON; diffing against an empty template");
                Ok(None)
            }
        }
    }
}

/// Compares the template sections the resource diff does not cover.
fn sections_match(deployed: &Template, proposed: &Template) -> bool {
    deployed.description() == proposed.description()
        && entries_match(deployed.mappings(), proposed.mappings())
        && entries_match(deployed.conditions(), proposed.conditions())
}

fn entries_match(left: &BTreeMap<String, Value>, right: &BTreeMap<String, Value>) -> bool {
    left.len() == right.len()
        && left.iter().all(|(key, value)| {
            right
                .get(key)
                .is_some_and(|other| differ::values_equal(value, other))
        })
}
