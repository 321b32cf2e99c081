//! Template differ and deployment-strategy classifier.
//!
//! [`diff`] compares two templates resource by resource using a recursive
//! structural comparator, so key order inside property objects and the
//! textual form of numbers never register as changes. The resulting
//! [`TemplateDiff`] answers the questions a deploy needs: is there anything to
//! do, how risky is it, and will the provider have to replace resources.

mod replacement;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{Map, Number, Value};

use crate::template::{Output, Parameter, Resource, Template};

pub use replacement::replacement_properties;

/// Classification of resource IDs between two template revisions.
///
/// The four sets partition the union of both revisions' resource IDs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TemplateDiff {
    /// IDs present only in the new template.
    pub added: BTreeSet<String>,
    /// IDs present in both with different definitions.
    pub modified: BTreeSet<String>,
    /// IDs present only in the old template.
    pub deleted: BTreeSet<String>,
    /// IDs present in both with identical definitions.
    pub unchanged: BTreeSet<String>,
    /// Whether the parameter section differs.
    pub parameters_changed: bool,
    /// Whether the output section differs.
    pub outputs_changed: bool,
}

/// How a change set should be applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DeploymentStrategy {
    /// Nothing changed.
    Skip,
    /// Resources are removed; the change destroys infrastructure.
    Replace,
    /// Resources are only added or modified.
    Update,
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Replace => "replace",
            Self::Update => "update",
        })
    }
}

/// Risk level of a single resource change.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RiskCategory {
    /// New resources.
    Safe,
    /// Modified resources.
    Caution,
    /// Deleted resources.
    Dangerous,
}

/// Changed resource IDs grouped by risk.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RiskReport {
    /// Added resources.
    pub safe: BTreeSet<String>,
    /// Modified resources.
    pub caution: BTreeSet<String>,
    /// Deleted resources.
    pub dangerous: BTreeSet<String>,
}

impl RiskReport {
    /// Highest risk present in the report, if anything changed.
    #[must_use]
    pub fn highest(&self) -> Option<RiskCategory> {
        if !self.dangerous.is_empty() {
            Some(RiskCategory::Dangerous)
        } else if !self.caution.is_empty() {
            Some(RiskCategory::Caution)
        } else if !self.safe.is_empty() {
            Some(RiskCategory::Safe)
        } else {
            None
        }
    }
}

/// Counts derived from a diff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiffStatistics {
    /// Size of the union of both resource-ID sets.
    pub total: usize,
    /// Number of added resources.
    pub added: usize,
    /// Number of modified resources.
    pub modified: usize,
    /// Number of deleted resources.
    pub deleted: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
    /// Share of resources touched by the change, from 0 to 100.
    pub change_percentage: f64,
}

/// A modified resource whose change forces replacement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Replacement {
    /// Resource being replaced.
    pub logical_id: String,
    /// What triggers the replacement.
    pub reason: ReplacementReason,
}

/// Why a modified resource must be replaced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReplacementReason {
    /// The resource kind changed.
    TypeChanged {
        /// Previous kind.
        from: String,
        /// New kind.
        to: String,
    },
    /// An identity-defining property changed.
    PropertyChanged(String),
}

impl fmt::Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ReplacementReason::TypeChanged { from, to } => {
                write!(f, "{}: type {from} -> {to}", self.logical_id)
            }
            ReplacementReason::PropertyChanged(property) => {
                write!(f, "{}: {property} changed", self.logical_id)
            }
        }
    }
}

/// Compares two templates.
#[must_use]
pub fn diff(old: &Template, new: &Template) -> TemplateDiff {
    let mut result = TemplateDiff::default();

    for (logical_id, new_resource) in new.resources() {
        match old.resource(logical_id) {
            None => {
                result.added.insert(logical_id.clone());
            }
            Some(old_resource) if resources_equal(old_resource, new_resource) => {
                result.unchanged.insert(logical_id.clone());
            }
            Some(_) => {
                result.modified.insert(logical_id.clone());
            }
        }
    }
    for logical_id in old.resources().keys() {
        if new.resource(logical_id).is_none() {
            result.deleted.insert(logical_id.clone());
        }
    }

    result.parameters_changed = !maps_equal(old.parameters(), new.parameters(), parameters_equal);
    result.outputs_changed = !maps_equal(old.outputs(), new.outputs(), outputs_equal);
    result
}

/// Returns `true` when applying the change would replace or remove physical
/// resources.
#[must_use]
pub fn requires_replacement(diff: &TemplateDiff, old: &Template, new: &Template) -> bool {
    !diff.deleted.is_empty() || !replacements(diff, old, new).is_empty()
}

/// Lists modified resources whose type or identity-defining properties
/// changed.
#[must_use]
pub fn replacements(diff: &TemplateDiff, old: &Template, new: &Template) -> Vec<Replacement> {
    let mut found = Vec::new();
    for logical_id in &diff.modified {
        let (Some(before), Some(after)) = (old.resource(logical_id), new.resource(logical_id))
        else {
            continue;
        };
        if before.resource_type != after.resource_type {
            found.push(Replacement {
                logical_id: logical_id.clone(),
                reason: ReplacementReason::TypeChanged {
                    from: before.resource_type.clone(),
                    to: after.resource_type.clone(),
                },
            });
            continue;
        }
        let Some(properties) = replacement_properties(&after.resource_type) else {
            continue;
        };
        for property in properties {
            let old_value = before.properties.get(*property);
            let new_value = after.properties.get(*property);
            if !options_equal(old_value, new_value, values_equal) {
                found.push(Replacement {
                    logical_id: logical_id.clone(),
                    reason: ReplacementReason::PropertyChanged((*property).to_owned()),
                });
            }
        }
    }
    found
}

impl TemplateDiff {
    /// Returns `true` when anything differs between the two revisions.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty()
            || !self.modified.is_empty()
            || !self.deleted.is_empty()
            || self.parameters_changed
            || self.outputs_changed
    }

    /// Decides how to apply the change. Deletions dominate.
    #[must_use]
    pub fn strategy(&self) -> DeploymentStrategy {
        if !self.has_changes() {
            DeploymentStrategy::Skip
        } else if !self.deleted.is_empty() {
            DeploymentStrategy::Replace
        } else {
            DeploymentStrategy::Update
        }
    }

    /// Groups changed resources by risk.
    #[must_use]
    pub fn categorize(&self) -> RiskReport {
        RiskReport {
            safe: self.added.clone(),
            caution: self.modified.clone(),
            dangerous: self.deleted.clone(),
        }
    }

    /// Computes change counts.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "percentage is a presentation value; resource counts are far below 2^52"
    )]
    pub fn statistics(&self) -> DiffStatistics {
        let added = self.added.len();
        let modified = self.modified.len();
        let deleted = self.deleted.len();
        let unchanged = self.unchanged.len();
        let total = added + modified + deleted + unchanged;
        let changed = added + modified + deleted;
        let change_percentage = if total == 0 {
            0.0
        } else {
            100.0 * changed as f64 / total as f64
        };
        DiffStatistics {
            total,
            added,
            modified,
            deleted,
            unchanged,
            change_percentage,
        }
    }
}

impl fmt::Display for TemplateDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.statistics();
        writeln!(
            f,
            "strategy: {} ({:.1}% of {} resources changed)",
            self.strategy(),
            stats.change_percentage,
            stats.total
        )?;
        for id in &self.added {
            writeln!(f, "  + {id}")?;
        }
        for id in &self.modified {
            writeln!(f, "  ~ {id}")?;
        }
        for id in &self.deleted {
            writeln!(f, "  - {id}")?;
        }
        if self.parameters_changed {
            writeln!(f, "  parameters changed")?;
        }
        if self.outputs_changed {
            writeln!(f, "  outputs changed")?;
        }
        Ok(())
    }
}

/// Recursive structural equality over dynamic values.
///
/// Objects compare as unordered maps and numbers compare by value, so `1` and
/// `1.0` are equal.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Object(a), Value::Object(b)) => objects_equal(a, b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

fn objects_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
}

#[expect(clippy::float_cmp, reason = "exact numeric identity is the intent")]
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn options_equal<T>(a: Option<&T>, b: Option<&T>, eq: impl Fn(&T, &T) -> bool) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => eq(x, y),
        (None, None) => true,
        _ => false,
    }
}

fn maps_equal<T>(
    a: &BTreeMap<String, T>,
    b: &BTreeMap<String, T>,
    eq: impl Fn(&T, &T) -> bool,
) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| eq(value, other)))
}

fn resources_equal(a: &Resource, b: &Resource) -> bool {
    a.resource_type == b.resource_type
        && a.depends_on == b.depends_on
        && a.condition == b.condition
        && a.deletion_policy == b.deletion_policy
        && a.update_replace_policy == b.update_replace_policy
        && objects_equal(&a.properties, &b.properties)
}

fn parameters_equal(a: &Parameter, b: &Parameter) -> bool {
    a.parameter_type == b.parameter_type
        && a.description == b.description
        && a.no_echo == b.no_echo
        && options_equal(a.default.as_ref(), b.default.as_ref(), values_equal)
        && a.allowed_values.len() == b.allowed_values.len()
        && a
            .allowed_values
            .iter()
            .zip(&b.allowed_values)
            .all(|(x, y)| values_equal(x, y))
}

fn outputs_equal(a: &Output, b: &Output) -> bool {
    a.description == b.description
        && values_equal(&a.value, &b.value)
        && options_equal(a.export.as_ref(), b.export.as_ref(), |x, y| {
            values_equal(&x.name, &y.name)
        })
}
