//! Resource graph assembler.
//!
//! The assembler collects resources from any number of independent
//! contribution steps, records the explicit dependency edges of each resource
//! as it is added, and turns everything into an immutable [`Template`] once
//! `build()` has proven the dependency graph acyclic.

mod error;
mod graph;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::template::{
    DeletionPolicy, Output, Parameter, Properties, RECOGNIZED_NAMESPACES, Resource, Template,
    TemplateParts, implicit_references,
};
use graph::DependencyGraph;

pub use error::AssemblyError;

/// Optional attributes accepted by [`TemplateAssembler::add_resource`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceOptions {
    depends_on: BTreeSet<String>,
    condition: Option<String>,
    deletion_policy: DeletionPolicy,
    update_replace_policy: Option<DeletionPolicy>,
}

impl ResourceOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds explicit dependencies.
    #[must_use]
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Gates the resource on a named condition.
    #[must_use]
    pub fn condition(mut self, name: impl Into<String>) -> Self {
        self.condition = Some(name.into());
        self
    }

    /// Sets the deletion policy.
    #[must_use]
    pub const fn deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = policy;
        self
    }

    /// Sets the update-replace policy.
    #[must_use]
    pub const fn update_replace_policy(mut self, policy: DeletionPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self
    }
}

/// Static, non-resource template sections populated first during `build()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateSettings {
    description: Option<String>,
    parameters: BTreeMap<String, Parameter>,
    mappings: BTreeMap<String, Value>,
    conditions: BTreeMap<String, Value>,
}

impl TemplateSettings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the template description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares a parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, parameter: Parameter) -> Self {
        self.parameters.insert(name.into(), parameter);
        self
    }

    /// Declares a mapping table.
    #[must_use]
    pub fn mapping(mut self, name: impl Into<String>, table: Value) -> Self {
        self.mappings.insert(name.into(), table);
        self
    }

    /// Declares a condition expression.
    #[must_use]
    pub fn condition(mut self, name: impl Into<String>, expression: Value) -> Self {
        self.conditions.insert(name.into(), expression);
        self
    }
}

/// Outputs contributed by the steps of a single `build()` call.
///
/// One builder is created per build and handed to every step in turn, so no
/// step ever observes outputs from another assembly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputsBuilder {
    outputs: BTreeMap<String, Output>,
}

impl OutputsBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a single output.
    pub fn add(&mut self, name: impl Into<String>, output: Output) -> &mut Self {
        let key = name.into();
        if self.outputs.insert(key.clone(), output).is_some() {
            debug!(output = %key, "output redefined by a later contribution step");
        }
        self
    }

    /// Adds or replaces several outputs at once.
    pub fn extend<I, S>(&mut self, outputs: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Output)>,
        S: Into<String>,
    {
        for (name, output) in outputs {
            self.add(name, output);
        }
        self
    }

    /// Number of outputs collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Returns `true` when no output has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    fn into_outputs(self) -> BTreeMap<String, Output> {
        self.outputs
    }
}

/// A feature module that contributes resources and outputs to a template.
///
/// Steps run in registration order during `build()`; the only ordering
/// between their resources is the dependency edges they declare.
pub trait ContributionStep {
    /// Name used in logs and step errors.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Adds resources, parameters, and outputs for this feature.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError`] when the feature's configuration or one of
    /// the resources it adds is invalid.
    fn contribute(
        &self,
        assembler: &mut TemplateAssembler,
        outputs: &mut OutputsBuilder,
    ) -> Result<(), AssemblyError>;
}

impl<F> ContributionStep for F
where
    F: Fn(&mut TemplateAssembler, &mut OutputsBuilder) -> Result<(), AssemblyError>,
{
    fn contribute(
        &self,
        assembler: &mut TemplateAssembler,
        outputs: &mut OutputsBuilder,
    ) -> Result<(), AssemblyError> {
        self(assembler, outputs)
    }
}

/// Builds a [`Template`] from resources and contribution steps.
#[derive(Default)]
pub struct TemplateAssembler {
    settings: TemplateSettings,
    parts: TemplateParts,
    graph: DependencyGraph,
    steps: Vec<Box<dyn ContributionStep>>,
}

impl fmt::Debug for TemplateAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateAssembler")
            .field("settings", &self.settings)
            .field("resources", &self.parts.resources.keys().collect::<Vec<_>>())
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl TemplateAssembler {
    /// Creates an assembler with no static settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an assembler whose parameters, mappings, and conditions are
    /// populated from `settings` at the start of `build()`.
    #[must_use]
    pub fn with_settings(settings: TemplateSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Registers a contribution step to run during `build()`.
    pub fn register_step(&mut self, step: impl ContributionStep + 'static) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Adds a resource, replacing any earlier definition with the same ID.
    ///
    /// Explicit dependencies are recorded in the dependency graph right away.
    /// Targets of `depends_on` are not checked for existence here; see
    /// [`Template::validate_references`].
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::InvalidLogicalId`],
    /// [`AssemblyError::UnknownNamespace`], [`AssemblyError::SelfDependency`],
    /// or [`AssemblyError::InvalidProperties`] when the definition is
    /// malformed.
    pub fn add_resource(
        &mut self,
        id: impl Into<String>,
        kind: impl Into<String>,
        properties: Value,
        options: ResourceOptions,
    ) -> Result<(), AssemblyError> {
        let logical_id = id.into();
        let resource_type = kind.into();

        if !is_valid_logical_id(&logical_id) {
            return Err(AssemblyError::InvalidLogicalId { logical_id });
        }
        if !RECOGNIZED_NAMESPACES
            .iter()
            .any(|prefix| resource_type.starts_with(prefix))
        {
            return Err(AssemblyError::UnknownNamespace {
                logical_id,
                resource_type,
            });
        }
        if options.depends_on.contains(&logical_id) {
            return Err(AssemblyError::SelfDependency { logical_id });
        }
        let property_map = match properties {
            Value::Object(map) => map,
            Value::Null => Properties::new(),
            _ => return Err(AssemblyError::InvalidProperties { logical_id }),
        };

        self.graph.set_edges(&logical_id, options.depends_on.clone());

        let resource = Resource {
            resource_type,
            properties: property_map,
            depends_on: options.depends_on,
            condition: options.condition,
            deletion_policy: options.deletion_policy,
            update_replace_policy: options.update_replace_policy,
        };
        if self
            .parts
            .resources
            .insert(logical_id.clone(), resource)
            .is_some()
        {
            debug!(logical_id = %logical_id, "resource redefined, keeping latest definition");
        }
        Ok(())
    }

    /// Declares a parameter, replacing any earlier one with the same name.
    pub fn add_parameter(&mut self, name: impl Into<String>, parameter: Parameter) -> &mut Self {
        self.parts.parameters.insert(name.into(), parameter);
        self
    }

    /// Declares a mapping table.
    pub fn add_mapping(&mut self, name: impl Into<String>, table: Value) -> &mut Self {
        self.parts.mappings.insert(name.into(), table);
        self
    }

    /// Declares a condition expression.
    pub fn add_condition(&mut self, name: impl Into<String>, expression: Value) -> &mut Self {
        self.parts.conditions.insert(name.into(), expression);
        self
    }

    /// Returns the resource currently registered under `logical_id`.
    #[must_use]
    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.parts.resources.get(logical_id)
    }

    /// Returns the explicit dependencies recorded for `logical_id`.
    #[must_use]
    pub fn explicit_dependencies(&self, logical_id: &str) -> Option<&BTreeSet<String>> {
        self.graph.edges_of(logical_id)
    }

    /// Checks the current resources for dependency cycles, combining
    /// explicit edges with references found in resource properties.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::CircularDependency`] naming the resource that
    /// closes the first cycle found.
    pub fn check_cycles(&self) -> Result<(), AssemblyError> {
        let mut graph = self.graph.clone();
        for (logical_id, resource) in &self.parts.resources {
            let implicit = implicit_references(resource)
                .into_iter()
                .filter(|target| self.parts.resources.contains_key(target));
            graph.extend_edges(logical_id, implicit);
        }
        graph.ensure_acyclic()
    }

    /// Runs every contribution step and produces the final template.
    ///
    /// The order is fixed: static settings, contribution steps, output merge,
    /// cycle validation. A cycle aborts the build and no template is returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`AssemblyError`] raised by a step, or
    /// [`AssemblyError::CircularDependency`] when the graph has a cycle.
    pub fn build(mut self) -> Result<Template, AssemblyError> {
        let settings = std::mem::take(&mut self.settings);
        self.parts.description = settings.description;
        self.parts.parameters.extend(settings.parameters);
        self.parts.mappings.extend(settings.mappings);
        self.parts.conditions.extend(settings.conditions);

        let steps = std::mem::take(&mut self.steps);
        let mut outputs = OutputsBuilder::new();
        for step in &steps {
            debug!(step = step.name(), "running contribution step");
            step.contribute(&mut self, &mut outputs)?;
        }

        self.parts.outputs.extend(outputs.into_outputs());
        self.check_cycles()?;

        debug!(
            resources = self.parts.resources.len(),
            outputs = self.parts.outputs.len(),
            "template assembled"
        );
        Ok(Template::from_parts(self.parts))
    }
}

fn is_valid_logical_id(logical_id: &str) -> bool {
    !logical_id.is_empty() && logical_id.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests;
