//! Unit tests for the resource graph assembler.

use rstest::rstest;
use serde_json::json;

use super::*;

fn bucket(assembler: &mut TemplateAssembler, id: &str, options: ResourceOptions) {
    assembler
        .add_resource(id, "AWS::S3::Bucket", json!({}), options)
        .unwrap_or_else(|err| panic!("add {id}: {err}"));
}

#[test]
fn last_definition_wins() {
    let mut assembler = TemplateAssembler::new();
    assembler
        .add_resource(
            "Shared",
            "AWS::EC2::SecurityGroup",
            json!({"GroupDescription": "first"}),
            ResourceOptions::new(),
        )
        .expect("first definition");
    assembler
        .add_resource(
            "Shared",
            "AWS::EC2::SecurityGroup",
            json!({"GroupDescription": "second"}),
            ResourceOptions::new().deletion_policy(DeletionPolicy::Retain),
        )
        .expect("second definition");

    let template = assembler.build().expect("build succeeds");
    let shared = template.resource("Shared").expect("resource present");
    assert_eq!(shared.properties["GroupDescription"], json!("second"));
    assert_eq!(shared.deletion_policy, DeletionPolicy::Retain);
    assert_eq!(template.resources().len(), 1);
}

#[test]
fn explicit_edges_are_recorded_before_build() {
    let mut assembler = TemplateAssembler::new();
    bucket(&mut assembler, "Logs", ResourceOptions::new());
    bucket(
        &mut assembler,
        "Assets",
        ResourceOptions::new().depends_on(["Logs"]),
    );
    let edges = assembler
        .explicit_dependencies("Assets")
        .expect("edges recorded");
    assert!(edges.contains("Logs"));
}

#[test]
fn overwrite_replaces_explicit_edges() {
    let mut assembler = TemplateAssembler::new();
    bucket(&mut assembler, "A", ResourceOptions::new().depends_on(["B"]));
    bucket(&mut assembler, "B", ResourceOptions::new().depends_on(["A"]));
    assert!(assembler.check_cycles().is_err());

    bucket(&mut assembler, "B", ResourceOptions::new());
    assert_eq!(assembler.check_cycles(), Ok(()));
}

#[rstest]
#[case::two_nodes(&["A", "B"])]
#[case::three_nodes(&["A", "B", "C"])]
#[case::five_nodes(&["A", "B", "C", "D", "E"])]
fn build_rejects_explicit_cycles(#[case] ring: &[&str]) {
    let mut assembler = TemplateAssembler::new();
    for (index, id) in ring.iter().enumerate() {
        let next = ring.get(index + 1).or_else(|| ring.first()).copied();
        let options = ResourceOptions::new().depends_on(next);
        bucket(&mut assembler, id, options);
    }
    let err = assembler.build().expect_err("cycle must be fatal");
    let AssemblyError::CircularDependency { logical_id, cycle } = err else {
        panic!("expected circular dependency, got {err:?}");
    };
    assert_eq!(logical_id, "A", "first inserted node closes the cycle");
    assert_eq!(cycle.len(), ring.len() + 1);
}

#[test]
fn build_rejects_cycles_through_property_references() {
    let mut assembler = TemplateAssembler::new();
    assembler
        .add_resource(
            "Role",
            "AWS::IAM::Role",
            json!({"Description": {"Fn::Sub": "used by ${Function}"}}),
            ResourceOptions::new(),
        )
        .expect("role");
    assembler
        .add_resource(
            "Function",
            "AWS::Lambda::Function",
            json!({"Role": {"Fn::GetAtt": ["Role", "Arn"]}}),
            ResourceOptions::new(),
        )
        .expect("function");
    let err = assembler.build().expect_err("implicit cycle");
    assert!(matches!(err, AssemblyError::CircularDependency { .. }));
}

#[test]
fn acyclic_graph_with_parameter_refs_builds() {
    let settings = TemplateSettings::new()
        .description("web tier")
        .parameter("Env", Parameter::new("String").with_default("dev"));
    let mut assembler = TemplateAssembler::with_settings(settings);
    assembler
        .add_resource(
            "Bucket",
            "AWS::S3::Bucket",
            json!({"BucketName": {"Ref": "Env"}}),
            ResourceOptions::new(),
        )
        .expect("bucket");
    bucket(
        &mut assembler,
        "Mirror",
        ResourceOptions::new().depends_on(["Bucket"]),
    );
    let template = assembler.build().expect("acyclic graph builds");
    assert_eq!(template.description(), Some("web tier"));
    assert!(template.parameters().contains_key("Env"));
    assert_eq!(template.resources().len(), 2);
}

#[test]
fn unknown_depends_on_targets_are_not_assembly_errors() {
    let mut assembler = TemplateAssembler::new();
    bucket(
        &mut assembler,
        "Orphan",
        ResourceOptions::new().depends_on(["Nowhere"]),
    );
    let template = assembler.build().expect("assembly does not validate targets");
    assert!(template.validate_references().is_err());
}

#[rstest]
#[case::empty("")]
#[case::dash("my-bucket")]
#[case::underscore("my_bucket")]
#[case::unicode("Bücket")]
fn rejects_invalid_logical_ids(#[case] id: &str) {
    let mut assembler = TemplateAssembler::new();
    let err = assembler
        .add_resource(id, "AWS::S3::Bucket", json!({}), ResourceOptions::new())
        .expect_err("invalid id");
    assert!(matches!(err, AssemblyError::InvalidLogicalId { .. }));
}

#[test]
fn rejects_unknown_namespace_and_self_dependency() {
    let mut assembler = TemplateAssembler::new();
    let err = assembler
        .add_resource("Thing", "Acme::Widget", json!({}), ResourceOptions::new())
        .expect_err("unknown namespace");
    assert!(matches!(err, AssemblyError::UnknownNamespace { .. }));

    let err = assembler
        .add_resource(
            "Loop",
            "Custom::Widget",
            json!({}),
            ResourceOptions::new().depends_on(["Loop"]),
        )
        .expect_err("self dependency");
    assert_eq!(
        err,
        AssemblyError::SelfDependency {
            logical_id: String::from("Loop")
        }
    );
}

#[test]
fn rejects_non_object_properties() {
    let mut assembler = TemplateAssembler::new();
    let err = assembler
        .add_resource("Thing", "AWS::S3::Bucket", json!([1, 2]), ResourceOptions::new())
        .expect_err("array properties");
    assert!(matches!(err, AssemblyError::InvalidProperties { .. }));
}

struct QueueFeature {
    queue_count: usize,
}

impl ContributionStep for QueueFeature {
    fn name(&self) -> &str {
        "queues"
    }

    fn contribute(
        &self,
        assembler: &mut TemplateAssembler,
        outputs: &mut OutputsBuilder,
    ) -> Result<(), AssemblyError> {
        if self.queue_count == 0 {
            return Err(AssemblyError::Step {
                step: self.name().to_owned(),
                message: String::from("at least one queue is required"),
            });
        }
        for index in 0..self.queue_count {
            let id = format!("Queue{index}");
            assembler.add_resource(&id, "AWS::SQS::Queue", json!({}), ResourceOptions::new())?;
            outputs.add(
                format!("{id}Url"),
                Output::new(json!({"Ref": id})).with_description("queue url"),
            );
        }
        Ok(())
    }
}

#[test]
fn contribution_steps_add_resources_and_outputs() {
    let mut assembler = TemplateAssembler::new();
    assembler.register_step(QueueFeature { queue_count: 2 });
    assembler.register_step(
        |asm: &mut TemplateAssembler, outputs: &mut OutputsBuilder| -> Result<(), AssemblyError> {
            asm.add_resource(
                "Topic",
                "AWS::SNS::Topic",
                json!({}),
                ResourceOptions::new().depends_on(["Queue0"]),
            )?;
            outputs.add("TopicArn", Output::new(json!({"Ref": "Topic"})));
            Ok(())
        },
    );

    let template = assembler.build().expect("steps succeed");
    let ids: Vec<_> = template.resources().keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["Queue0", "Queue1", "Topic"]);
    let outputs: Vec<_> = template.outputs().keys().map(String::as_str).collect();
    assert_eq!(outputs, vec!["Queue0Url", "Queue1Url", "TopicArn"]);
}

#[test]
fn failing_step_aborts_build() {
    let mut assembler = TemplateAssembler::new();
    assembler.register_step(QueueFeature { queue_count: 0 });
    let err = assembler.build().expect_err("step failure propagates");
    assert!(matches!(err, AssemblyError::Step { ref step, .. } if step == "queues"));
}

#[test]
fn outputs_builder_keeps_last_definition() {
    let mut outputs = OutputsBuilder::new();
    outputs
        .add("Url", Output::new(json!("first")))
        .add("Url", Output::new(json!("second")));
    assert_eq!(outputs.len(), 1);
    assert_eq!(
        outputs.into_outputs().get("Url").map(|o| o.value.clone()),
        Some(json!("second"))
    );
}
