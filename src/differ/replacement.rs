//! Properties whose change forces the provider to replace a resource.
//!
//! The table only lists a handful of common kinds. Kinds missing from it are
//! treated as updatable in place.

/// Identity-defining property names per resource kind.
const REPLACEMENT_PROPERTIES: &[(&str, &[&str])] = &[
    ("AWS::S3::Bucket", &["BucketName"]),
    (
        "AWS::EC2::Instance",
        &[
            "ImageId",
            "InstanceType",
            "KeyName",
            "AvailabilityZone",
            "SubnetId",
        ],
    ),
    (
        "AWS::DynamoDB::Table",
        &["TableName", "KeySchema", "LocalSecondaryIndexes"],
    ),
    (
        "AWS::RDS::DBInstance",
        &[
            "DBInstanceIdentifier",
            "Engine",
            "DBName",
            "StorageEncrypted",
        ],
    ),
    ("AWS::Lambda::Function", &["FunctionName", "PackageType"]),
    ("AWS::SQS::Queue", &["QueueName", "FifoQueue"]),
    ("AWS::SNS::Topic", &["TopicName", "FifoTopic"]),
    ("AWS::ECS::Cluster", &["ClusterName"]),
    ("AWS::ECR::Repository", &["RepositoryName"]),
    (
        "AWS::ElastiCache::CacheCluster",
        &["ClusterName", "Engine", "CacheSubnetGroupName"],
    ),
    ("AWS::IAM::Role", &["RoleName", "Path"]),
    ("AWS::EC2::SecurityGroup", &["GroupName", "GroupDescription", "VpcId"]),
];

/// Returns the identity-defining properties of `resource_type`, if the kind
/// is listed.
#[must_use]
pub fn replacement_properties(resource_type: &str) -> Option<&'static [&'static str]> {
    REPLACEMENT_PROPERTIES
        .iter()
        .find(|(kind, _)| *kind == resource_type)
        .map(|(_, properties)| *properties)
}
