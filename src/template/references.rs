//! Implicit dependency extraction from resource properties.

use std::collections::BTreeSet;

use serde_json::Value;

use super::Resource;

const REF: &str = "Ref";
const GET_ATT: &str = "Fn::GetAtt";
const SUB: &str = "Fn::Sub";

/// Returns `true` for provider pseudo parameters such as `AWS::Region`.
#[must_use]
pub fn is_pseudo_parameter(name: &str) -> bool {
    name.starts_with("AWS::")
}

/// Collects every logical name referenced from the resource's properties.
///
/// Recognizes `{"Ref": X}`, `{"Fn::GetAtt": [X, attr]}` (and the `"X.attr"`
/// shorthand), and `${X}` / `${X.attr}` tokens in `Fn::Sub` templates.
/// Pseudo parameters are skipped. The result may name parameters as well as
/// resources; callers decide which of those become graph edges.
#[must_use]
pub fn implicit_references(resource: &Resource) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for value in resource.properties.values() {
        collect(value, &mut found);
    }
    found
}

fn collect(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(target) = map.get(REF).and_then(Value::as_str) {
                    record(target, found);
                    return;
                }
                if let Some(attribute) = map.get(GET_ATT) {
                    if let Some(target) = get_att_target(attribute) {
                        record(target, found);
                    }
                }
                if let Some(sub) = map.get(SUB) {
                    collect_sub(sub, found);
                }
            }
            for nested in map.values() {
                collect(nested, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, found);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

fn get_att_target(attribute: &Value) -> Option<&str> {
    match attribute {
        Value::Array(parts) => parts.first().and_then(Value::as_str),
        Value::String(dotted) => dotted.split_once('.').map(|(target, _)| target),
        _ => None,
    }
}

fn collect_sub(sub: &Value, found: &mut BTreeSet<String>) {
    match sub {
        Value::String(template) => {
            for token in sub_tokens(template) {
                record(token, found);
            }
        }
        Value::Array(parts) => {
            let Some(template) = parts.first().and_then(Value::as_str) else {
                return;
            };
            let local = parts.get(1).and_then(Value::as_object);
            for token in sub_tokens(template) {
                if local.is_some_and(|vars| vars.contains_key(token)) {
                    continue;
                }
                record(token, found);
            }
        }
        _ => {}
    }
}

/// Yields the logical name of every `${...}` placeholder, skipping literal
/// `${!...}` escapes.
fn sub_tokens(template: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let Some(after) = rest.get(start + 2..) else {
            break;
        };
        let Some(end) = after.find('}') else {
            break;
        };
        let inner = after.get(..end).unwrap_or_default();
        if !inner.starts_with('!') {
            let name = inner.split_once('.').map_or(inner, |(name, _)| name).trim();
            if !name.is_empty() {
                tokens.push(name);
            }
        }
        rest = after.get(end + 1..).unwrap_or_default();
    }
    tokens
}

fn record(target: &str, found: &mut BTreeSet<String>) {
    if !target.is_empty() && !is_pseudo_parameter(target) {
        found.insert(target.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn resource(properties: Value) -> Resource {
        let Value::Object(properties) = properties else {
            panic!("test properties must be an object");
        };
        Resource {
            resource_type: String::from("AWS::Test::Thing"),
            properties,
            depends_on: BTreeSet::new(),
            condition: None,
            deletion_policy: super::super::DeletionPolicy::Delete,
            update_replace_policy: None,
        }
    }

    #[test]
    fn finds_ref_and_get_att_at_any_depth() {
        let res = resource(json!({
            "Bucket": {"Ref": "Storage"},
            "Nested": {"List": [{"Fn::GetAtt": ["Queue", "Arn"]}, "plain"]},
            "Dotted": {"Fn::GetAtt": "Topic.TopicName"}
        }));
        let refs = implicit_references(&res);
        assert_eq!(
            refs.into_iter().collect::<Vec<_>>(),
            vec!["Queue", "Storage", "Topic"]
        );
    }

    #[test]
    fn skips_pseudo_parameters() {
        let res = resource(json!({
            "Region": {"Ref": "AWS::Region"},
            "Name": {"Fn::Sub": "${AWS::StackName}-${Bucket}"}
        }));
        let refs = implicit_references(&res);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec!["Bucket"]);
    }

    #[test]
    fn sub_ignores_local_variables_and_literals() {
        let res = resource(json!({
            "Command": {"Fn::Sub": [
                "run ${Local} ${Role.Arn} ${!Literal}",
                {"Local": {"Ref": "Param"}}
            ]}
        }));
        let refs = implicit_references(&res);
        assert_eq!(
            refs.into_iter().collect::<Vec<_>>(),
            vec!["Param", "Role"]
        );
    }

    #[test]
    fn plain_strings_are_not_references() {
        let res = resource(json!({"Name": "Bucket", "Count": 3}));
        assert!(implicit_references(&res).is_empty());
    }
}
