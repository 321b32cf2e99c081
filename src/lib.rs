//! Core library for the Stratus infrastructure-as-code tool.
//!
//! The crate assembles CloudFormation-style templates from feature modules,
//! diffs template revisions to pick a deployment strategy, signs AWS API
//! requests with Signature Version 4, and drives stack deployments through a
//! polling state machine until they settle.

pub mod assembler;
pub mod config;
pub mod deploy;
pub mod differ;
pub mod signer;
pub mod stack;
pub mod template;
pub mod test_support;

pub use assembler::{
    AssemblyError, ContributionStep, OutputsBuilder, ResourceOptions, TemplateAssembler,
    TemplateSettings,
};
pub use config::{AwsConfig, ConfigError, DeployConfig};
pub use deploy::{DeployAction, DeployError, DeployOptions, DeployOrchestrator, DeployReport};
pub use differ::{DeploymentStrategy, RiskCategory, TemplateDiff};
pub use signer::{AwsClient, Credentials, HttpRequest, RequestSigner, SigningError, TransportError};
pub use stack::{
    CloudFormationControlPlane, ControlPlane, OperationKind, Stack, StackError, StackStatus,
    StackWaiter, TokioSleeper,
};
pub use template::{DeletionPolicy, Output, Parameter, Resource, Template, TemplateError};
