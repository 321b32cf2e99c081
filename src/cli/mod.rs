//! Command-line interface definitions for the `stratus` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use camino::Utf8PathBuf;
use clap::Parser;

/// Top-level CLI for the `stratus` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stratus",
    about = "Diff and deploy CloudFormation-style stack templates",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Compare two template files and print the deployment strategy.
    #[command(name = "diff", about = "Compare two template files")]
    Diff(DiffCommand),
    /// Create or update a stack from a template file.
    #[command(name = "deploy", about = "Create or update a stack from a template")]
    Deploy(DeployCommand),
    /// Delete a stack and wait for the deletion to finish.
    #[command(name = "destroy", about = "Delete a stack")]
    Destroy(DestroyCommand),
    /// Print the current status and outputs of a stack.
    #[command(name = "status", about = "Show the status of a stack")]
    Status(StatusCommand),
}

/// Arguments for the `stratus diff` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DiffCommand {
    /// Previously deployed template.
    #[arg(value_name = "OLD")]
    pub(crate) old: Utf8PathBuf,
    /// Candidate template.
    #[arg(value_name = "NEW")]
    pub(crate) new: Utf8PathBuf,
}

/// Arguments for the `stratus deploy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DeployCommand {
    /// Name of the stack to create or update.
    #[arg(value_name = "STACK")]
    pub(crate) stack: String,
    /// Template to deploy.
    #[arg(value_name = "TEMPLATE")]
    pub(crate) template: Utf8PathBuf,
    /// Diff against this file instead of the template currently deployed.
    #[arg(long, value_name = "FILE")]
    pub(crate) previous: Option<Utf8PathBuf>,
    /// Proceed even when resources would be deleted or replaced.
    ///
    /// Also enabled by `STRATUS_ALLOW_DESTRUCTIVE=true`.
    #[arg(long)]
    pub(crate) allow_destructive: bool,
    /// Template parameter value, as KEY=VALUE. May be repeated.
    #[arg(long = "parameter", value_name = "KEY=VALUE")]
    pub(crate) parameters: Vec<String>,
    /// Stack tag, as KEY=VALUE. May be repeated.
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub(crate) tags: Vec<String>,
}

/// Arguments for the `stratus destroy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DestroyCommand {
    /// Name of the stack to delete.
    #[arg(value_name = "STACK")]
    pub(crate) stack: String,
    /// Logical ID whose physical resource is kept. May be repeated.
    ///
    /// Use this to finish a deletion that previously failed on resources
    /// that cannot be removed, such as non-empty buckets.
    #[arg(long, value_name = "LOGICAL_ID")]
    pub(crate) retain: Vec<String>,
}

/// Arguments for the `stratus status` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct StatusCommand {
    /// Name of the stack to inspect.
    #[arg(value_name = "STACK")]
    pub(crate) stack: String,
}
