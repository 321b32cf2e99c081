//! In-memory model of a synthesized stack template.
//!
//! A [`Template`] is produced by the
//! [`TemplateAssembler`](crate::assembler::TemplateAssembler) and is immutable
//! afterwards: redeploys build a fresh template rather than mutating an old
//! one. Templates serialize to CloudFormation JSON and can be read back from
//! it, which is how a previously deployed revision is recovered for diffing.

mod references;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use references::{implicit_references, is_pseudo_parameter};

/// Template format version emitted in every serialized template.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Resource kind namespaces accepted by the assembler.
pub const RECOGNIZED_NAMESPACES: [&str; 3] = ["AWS::", "Alexa::", "Custom::"];

/// Ordered property bag attached to a resource.
pub type Properties = Map<String, Value>;

/// What happens to the physical resource when it leaves the stack.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq, Hash)]
pub enum DeletionPolicy {
    /// The physical resource is deleted.
    #[default]
    Delete,
    /// The physical resource is kept and detached from the stack.
    Retain,
    /// A final snapshot is taken before deletion.
    Snapshot,
}

impl DeletionPolicy {
    const fn is_default(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// A single declared resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    /// Namespaced resource kind, for example `AWS::S3::Bucket`.
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Kind-specific configuration, opaque to the assembler.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Properties,
    /// Logical IDs this resource must be created after.
    #[serde(
        default,
        skip_serializing_if = "BTreeSet::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub depends_on: BTreeSet<String>,
    /// Name of the template condition gating this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Policy applied when the resource is removed from the stack.
    #[serde(default, skip_serializing_if = "DeletionPolicy::is_default")]
    pub deletion_policy: DeletionPolicy,
    /// Policy applied to the old physical resource when an update replaces it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl Resource {
    /// Returns the recognized namespace prefix of the resource type, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&'static str> {
        RECOGNIZED_NAMESPACES
            .into_iter()
            .find(|prefix| self.resource_type.starts_with(prefix))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => BTreeSet::from([id]),
        OneOrMany::Many(ids) => ids.into_iter().collect(),
    })
}

/// A template input parameter.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    /// Parameter type such as `String` or `Number`.
    #[serde(rename = "Type")]
    pub parameter_type: String,
    /// Value used when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Closed set of accepted values, when constrained.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
    /// Whether the value is masked in provider consoles.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_echo: bool,
}

impl Parameter {
    /// Creates a parameter of the given type with no default.
    #[must_use]
    pub fn new(parameter_type: impl Into<String>) -> Self {
        Self {
            parameter_type: parameter_type.into(),
            default: None,
            description: None,
            allowed_values: Vec::new(),
            no_echo: false,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Export block of an output.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct OutputExport {
    /// Cross-stack export name.
    pub name: Value,
}

/// A template output.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Value expression, usually a `Ref` or `Fn::GetAtt`.
    pub value: Value,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional cross-stack export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<OutputExport>,
}

impl Output {
    /// Creates an output for the given value expression.
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            description: None,
            export: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Exports the output under the given name.
    #[must_use]
    pub fn with_export_name(mut self, name: impl Into<String>) -> Self {
        self.export = Some(OutputExport {
            name: Value::String(name.into()),
        });
        self
    }
}

fn default_format_version() -> String {
    TEMPLATE_FORMAT_VERSION.to_owned()
}

/// The complete, immutable declaration of one deployable unit.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion", default = "default_format_version")]
    format_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, Parameter>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    mappings: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    conditions: BTreeMap<String, Value>,
    #[serde(default)]
    resources: BTreeMap<String, Resource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

/// Sections of a template collected by the assembler.
#[derive(Debug, Default)]
pub(crate) struct TemplateParts {
    pub(crate) description: Option<String>,
    pub(crate) parameters: BTreeMap<String, Parameter>,
    pub(crate) mappings: BTreeMap<String, Value>,
    pub(crate) conditions: BTreeMap<String, Value>,
    pub(crate) resources: BTreeMap<String, Resource>,
    pub(crate) outputs: BTreeMap<String, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self::from_parts(TemplateParts::default())
    }
}

impl Template {
    pub(crate) fn from_parts(parts: TemplateParts) -> Self {
        Self {
            format_version: default_format_version(),
            description: parts.description,
            parameters: parts.parameters,
            mappings: parts.mappings,
            conditions: parts.conditions,
            resources: parts.resources,
            outputs: parts.outputs,
        }
    }

    /// Parses a template from CloudFormation JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] when the document is not a valid
    /// template.
    pub fn from_json_str(document: &str) -> Result<Self, TemplateError> {
        serde_json::from_str(document).map_err(|err| TemplateError::Parse(err.to_string()))
    }

    /// Serializes the template to CloudFormation JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Serialize`] when a property value cannot be
    /// rendered.
    pub fn to_json_string(&self) -> Result<String, TemplateError> {
        serde_json::to_string(self).map_err(|err| TemplateError::Serialize(err.to_string()))
    }

    /// Serializes the template to indented CloudFormation JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Serialize`] when a property value cannot be
    /// rendered.
    pub fn to_json_pretty(&self) -> Result<String, TemplateError> {
        serde_json::to_string_pretty(self).map_err(|err| TemplateError::Serialize(err.to_string()))
    }

    /// Template description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared parameters keyed by name.
    #[must_use]
    pub const fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    /// Static lookup tables keyed by mapping name.
    #[must_use]
    pub const fn mappings(&self) -> &BTreeMap<String, Value> {
        &self.mappings
    }

    /// Condition expressions keyed by name.
    #[must_use]
    pub const fn conditions(&self) -> &BTreeMap<String, Value> {
        &self.conditions
    }

    /// Declared resources keyed by logical ID.
    #[must_use]
    pub const fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    /// Looks up a single resource.
    #[must_use]
    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Declared outputs keyed by name.
    #[must_use]
    pub const fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    /// Checks that every explicit dependency, implicit property reference, and
    /// resource condition resolves within the template.
    ///
    /// Assembly deliberately skips this so that building stays cheap; callers
    /// run it before sending a template to the control plane.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnresolvedReferences`] listing every dangling
    /// reference found.
    pub fn validate_references(&self) -> Result<(), TemplateError> {
        let mut unresolved = Vec::new();
        for (logical_id, resource) in &self.resources {
            for target in &resource.depends_on {
                if !self.resources.contains_key(target) {
                    unresolved.push(UnresolvedReference::new(
                        logical_id,
                        target,
                        ReferenceKind::DependsOn,
                    ));
                }
            }
            for target in implicit_references(resource) {
                if !self.resources.contains_key(&target) && !self.parameters.contains_key(&target)
                {
                    unresolved.push(UnresolvedReference::new(
                        logical_id,
                        &target,
                        ReferenceKind::Property,
                    ));
                }
            }
            if let Some(condition) = &resource.condition {
                if !self.conditions.contains_key(condition) {
                    unresolved.push(UnresolvedReference::new(
                        logical_id,
                        condition,
                        ReferenceKind::Condition,
                    ));
                }
            }
        }

        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(TemplateError::UnresolvedReferences(unresolved))
        }
    }
}

/// Where a dangling reference was found.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReferenceKind {
    /// An entry of `DependsOn`.
    DependsOn,
    /// A `Ref`, `Fn::GetAtt`, or `Fn::Sub` token inside the properties.
    Property,
    /// The resource's `Condition`.
    Condition,
}

/// A reference that does not resolve within its template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnresolvedReference {
    /// Resource holding the reference.
    pub from: String,
    /// Name that failed to resolve.
    pub target: String,
    /// Kind of reference.
    pub kind: ReferenceKind,
}

impl UnresolvedReference {
    fn new(from: &str, target: &str, kind: ReferenceKind) -> Self {
        Self {
            from: from.to_owned(),
            target: target.to_owned(),
            kind,
        }
    }
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ReferenceKind::DependsOn => "depends on",
            ReferenceKind::Property => "references",
            ReferenceKind::Condition => "uses condition",
        };
        write!(f, "{} {kind} unknown '{}'", self.from, self.target)
    }
}

/// Errors raised when reading, writing, or validating templates.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TemplateError {
    /// Raised when a template document cannot be parsed.
    #[error("invalid template document: {0}")]
    Parse(String),
    /// Raised when a template cannot be serialized.
    #[error("failed to serialize template: {0}")]
    Serialize(String),
    /// Raised when references do not resolve.
    #[error("unresolved references: {}", join_references(.0))]
    UnresolvedReferences(Vec<UnresolvedReference>),
}

fn join_references(references: &[UnresolvedReference]) -> String {
    references
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
