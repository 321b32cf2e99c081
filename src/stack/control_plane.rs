//! Remote control plane abstraction and its CloudFormation implementation.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{Stack, StackError, StackOutput, StackStatus};
use crate::signer::{AwsClient, TransportError};
use crate::template::{Template, TemplateError};

/// Future returned by control plane operations.
pub type ControlPlaneFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StackError>> + Send + 'a>>;

/// API version of the CloudFormation Query protocol.
pub const CLOUDFORMATION_API_VERSION: &str = "2010-05-15";

/// Capabilities acknowledged by default on create and update.
pub const DEFAULT_CAPABILITIES: [&str; 2] = ["CAPABILITY_IAM", "CAPABILITY_NAMED_IAM"];

/// Create or update request for a stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackRequest {
    /// Stack name.
    pub stack_name: String,
    /// Serialized template document.
    pub template_body: String,
    /// Parameter values passed to the template.
    pub parameters: Vec<(String, String)>,
    /// Acknowledged capabilities.
    pub capabilities: Vec<String>,
    /// Stack-level tags.
    pub tags: Vec<(String, String)>,
}

impl StackRequest {
    /// Builds a request deploying `template` as `stack_name`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Serialize`] when the template cannot be
    /// rendered.
    pub fn from_template(
        stack_name: impl Into<String>,
        template: &Template,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            stack_name: stack_name.into(),
            template_body: template.to_json_string()?,
            parameters: Vec::new(),
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| (*c).to_owned()).collect(),
            tags: Vec::new(),
        })
    }

    /// Adds a parameter value.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    /// Adds a stack tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }
}

/// Result of requesting a stack update.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpdateOutcome {
    /// The update was accepted and is in progress.
    Started,
    /// The control plane found nothing to change.
    NoChanges,
}

/// Minimal interface to a stack control plane.
pub trait ControlPlane: Send + Sync {
    /// Starts creating a stack and returns its identifier.
    fn create_stack<'a>(&'a self, request: &'a StackRequest) -> ControlPlaneFuture<'a, String>;

    /// Starts updating an existing stack.
    fn update_stack<'a>(
        &'a self,
        request: &'a StackRequest,
    ) -> ControlPlaneFuture<'a, UpdateOutcome>;

    /// Starts deleting a stack, keeping the physical resources of `retain`.
    fn delete_stack<'a>(
        &'a self,
        stack_name: &'a str,
        retain: &'a [String],
    ) -> ControlPlaneFuture<'a, ()>;

    /// Returns the current state of a stack, or `None` when it does not
    /// exist.
    fn describe_stack<'a>(&'a self, stack_name: &'a str) -> ControlPlaneFuture<'a, Option<Stack>>;

    /// Returns the template body last deployed to a stack, or `None` when
    /// the stack does not exist.
    fn get_template<'a>(&'a self, stack_name: &'a str) -> ControlPlaneFuture<'a, Option<String>>;
}

/// [`ControlPlane`] backed by the CloudFormation Query API.
#[derive(Clone, Debug)]
pub struct CloudFormationControlPlane {
    client: AwsClient,
}

impl CloudFormationControlPlane {
    /// Wraps a client scoped to the `cloudformation` service.
    #[must_use]
    pub const fn new(client: AwsClient) -> Self {
        Self { client }
    }

    async fn call(
        &self,
        action: &str,
        params: &[(String, String)],
    ) -> Result<Option<Value>, TransportError> {
        debug!(action, "calling CloudFormation");
        self.client
            .query_request(action, CLOUDFORMATION_API_VERSION, params)
            .await
    }
}

impl ControlPlane for CloudFormationControlPlane {
    fn create_stack<'a>(&'a self, request: &'a StackRequest) -> ControlPlaneFuture<'a, String> {
        Box::pin(async move {
            let params = stack_params(request);
            let response = self.call("CreateStack", &params).await?;
            result_field(response.as_ref(), "CreateStack", "StackId")
                .map(str::to_owned)
                .ok_or_else(|| StackError::InvalidResponse(String::from("CreateStack without StackId")))
        })
    }

    fn update_stack<'a>(
        &'a self,
        request: &'a StackRequest,
    ) -> ControlPlaneFuture<'a, UpdateOutcome> {
        Box::pin(async move {
            let params = stack_params(request);
            match self.call("UpdateStack", &params).await {
                Ok(_) => Ok(UpdateOutcome::Started),
                Err(TransportError::Provider { message, .. })
                    if message.contains("No updates are to be performed") =>
                {
                    debug!(stack = %request.stack_name, "control plane reported no changes");
                    Ok(UpdateOutcome::NoChanges)
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn delete_stack<'a>(
        &'a self,
        stack_name: &'a str,
        retain: &'a [String],
    ) -> ControlPlaneFuture<'a, ()> {
        Box::pin(async move {
            let mut params = vec![
                (String::from("StackName"), stack_name.to_owned()),
                (String::from("ClientRequestToken"), request_token()),
            ];
            push_members(&mut params, "RetainResources", retain.iter().cloned());
            self.call("DeleteStack", &params).await?;
            Ok(())
        })
    }

    fn describe_stack<'a>(&'a self, stack_name: &'a str) -> ControlPlaneFuture<'a, Option<Stack>> {
        Box::pin(async move {
            let params = [(String::from("StackName"), stack_name.to_owned())];
            let response = match self.call("DescribeStacks", &params).await {
                Ok(response) => response,
                Err(err) if is_missing_stack(&err) => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            let stacks = response
                .as_ref()
                .and_then(|value| result(value, "DescribeStacks"))
                .and_then(|value| value.get("Stacks"));
            crate::signer::members(stacks)
                .into_iter()
                .next()
                .map(parse_stack)
                .transpose()
        })
    }

    fn get_template<'a>(&'a self, stack_name: &'a str) -> ControlPlaneFuture<'a, Option<String>> {
        Box::pin(async move {
            let params = [(String::from("StackName"), stack_name.to_owned())];
            match self.call("GetTemplate", &params).await {
                Ok(response) => Ok(result_field(response.as_ref(), "GetTemplate", "TemplateBody")
                    .map(str::to_owned)),
                Err(err) if is_missing_stack(&err) => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
    }
}

fn request_token() -> String {
    format!("stratus-{}", Uuid::new_v4())
}

fn stack_params(request: &StackRequest) -> Vec<(String, String)> {
    let mut params = vec![
        (String::from("StackName"), request.stack_name.clone()),
        (String::from("TemplateBody"), request.template_body.clone()),
        (String::from("ClientRequestToken"), request_token()),
    ];
    push_members(&mut params, "Capabilities", request.capabilities.iter().cloned());
    for (index, (key, value)) in request.parameters.iter().enumerate() {
        let prefix = format!("Parameters.member.{}", index + 1);
        params.push((format!("{prefix}.ParameterKey"), key.clone()));
        params.push((format!("{prefix}.ParameterValue"), value.clone()));
    }
    for (index, (key, value)) in request.tags.iter().enumerate() {
        let prefix = format!("Tags.member.{}", index + 1);
        params.push((format!("{prefix}.Key"), key.clone()));
        params.push((format!("{prefix}.Value"), value.clone()));
    }
    params
}

fn push_members(
    params: &mut Vec<(String, String)>,
    name: &str,
    values: impl IntoIterator<Item = String>,
) {
    for (index, value) in values.into_iter().enumerate() {
        params.push((format!("{name}.member.{}", index + 1), value));
    }
}

fn is_missing_stack(err: &TransportError) -> bool {
    matches!(err, TransportError::Provider { message, .. } if message.contains("does not exist"))
}

fn result<'v>(value: &'v Value, action: &str) -> Option<&'v Value> {
    value
        .get(format!("{action}Response"))
        .and_then(|response| response.get(format!("{action}Result")))
}

fn result_field<'v>(value: Option<&'v Value>, action: &str, field: &str) -> Option<&'v str> {
    value
        .and_then(|root| result(root, action))
        .and_then(|body| body.get(field))
        .and_then(Value::as_str)
}

fn text(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// Converts one `<member>` of a `DescribeStacks` result into a [`Stack`].
pub(crate) fn parse_stack(value: &Value) -> Result<Stack, StackError> {
    let name = text(value, "StackName")
        .ok_or_else(|| StackError::InvalidResponse(String::from("stack without StackName")))?;
    let status = text(value, "StackStatus")
        .ok_or_else(|| StackError::InvalidResponse(format!("stack {name} without StackStatus")))?;
    let outputs = crate::signer::members(value.get("Outputs"))
        .into_iter()
        .filter_map(|output| {
            Some(StackOutput {
                key: text(output, "OutputKey")?,
                value: text(output, "OutputValue").unwrap_or_default(),
                description: text(output, "Description"),
                export_name: text(output, "ExportName"),
            })
        })
        .collect();
    Ok(Stack {
        stack_id: text(value, "StackId"),
        status: StackStatus::from(status),
        status_reason: text(value, "StackStatusReason"),
        outputs,
        name,
    })
}
