//! Binary entry point for the Stratus CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use stratus::differ::{self, DeploymentStrategy};
use stratus::{
    AwsConfig, CloudFormationControlPlane, ConfigError, DeployAction, DeployConfig, DeployError,
    DeployOptions, DeployOrchestrator, DeployReport, Stack, Template, TemplateError, TokioSleeper,
};

use cli::{Cli, DeployCommand, DestroyCommand, DiffCommand, StatusCommand};

/// Service name used for CloudFormation signing and endpoints.
const CLOUDFORMATION_SERVICE: &str = "cloudformation";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("{path}: {source}")]
    Template {
        path: String,
        #[source]
        source: TemplateError,
    },
    #[error("invalid --{flag} value '{value}': expected KEY=VALUE")]
    InvalidPair { flag: &'static str, value: String },
    #[error(transparent)]
    Deploy(#[from] DeployError),
}

type Orchestrator = DeployOrchestrator<CloudFormationControlPlane, TokioSleeper>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(&cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: &Cli) -> Result<(), CliError> {
    match cli {
        Cli::Diff(command) => diff_command(command),
        Cli::Deploy(command) => deploy_command(command).await,
        Cli::Destroy(command) => destroy_command(command).await,
        Cli::Status(command) => status_command(command).await,
    }
}

fn diff_command(args: &DiffCommand) -> Result<(), CliError> {
    let old = read_template(&args.old)?;
    let new = read_template(&args.new)?;
    let changes = differ::diff(&old, &new);
    let mut out = io::stdout();
    write!(out, "{changes}").ok();
    for replacement in differ::replacements(&changes, &old, &new) {
        writeln!(out, "  ! replaces {replacement}").ok();
    }
    Ok(())
}

async fn deploy_command(args: &DeployCommand) -> Result<(), CliError> {
    let template = read_template(&args.template)?;
    let mut options = DeployOptions::new();
    if let Some(path) = &args.previous {
        options = options.previous(read_template(path)?);
    }
    for pair in &args.parameters {
        let (key, value) = parse_pair("parameter", pair)?;
        options = options.parameter(key, value);
    }
    for pair in &args.tags {
        let (key, value) = parse_pair("tag", pair)?;
        options = options.tag(key, value);
    }

    let (orchestrator, allow_destructive) = build_orchestrator()?;
    options = options.allow_destructive(args.allow_destructive || allow_destructive);

    let report = orchestrator.deploy(&args.stack, &template, &options).await?;
    write_report(io::stdout(), &args.stack, &report);
    Ok(())
}

async fn destroy_command(args: &DestroyCommand) -> Result<(), CliError> {
    let (orchestrator, _) = build_orchestrator()?;
    let deleted = orchestrator.destroy(&args.stack, &args.retain).await?;
    let message = if deleted {
        format!("deleted stack {}", args.stack)
    } else {
        format!("stack {} does not exist", args.stack)
    };
    writeln!(io::stdout(), "{message}").ok();
    Ok(())
}

async fn status_command(args: &StatusCommand) -> Result<(), CliError> {
    let (orchestrator, _) = build_orchestrator()?;
    let mut out = io::stdout();
    match orchestrator.status(&args.stack).await? {
        Some(stack) => write_stack(&mut out, &stack),
        None => {
            writeln!(out, "stack {} does not exist", args.stack).ok();
        }
    }
    Ok(())
}

fn build_orchestrator() -> Result<(Orchestrator, bool), CliError> {
    let aws = AwsConfig::load_without_cli_args()?;
    let client = aws.client(CLOUDFORMATION_SERVICE)?;
    let deploy = DeployConfig::load_without_cli_args()?;
    deploy.validate()?;

    let orchestrator = DeployOrchestrator::new(CloudFormationControlPlane::new(client), TokioSleeper)
        .with_poll_interval(deploy.poll_interval())
        .with_max_attempts(deploy.max_attempts)
        .with_cancellation(cancel_on_interrupt());
    Ok((orchestrator, deploy.allow_destructive))
}

fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    token
}

fn read_template(path: &Utf8Path) -> Result<Template, CliError> {
    let document = read_to_string_ambient(path).map_err(|message| CliError::Read {
        path: path.to_string(),
        message,
    })?;
    Template::from_json_str(&document).map_err(|source| CliError::Template {
        path: path.to_string(),
        source,
    })
}

fn read_to_string_ambient(path: &Utf8Path) -> Result<String, String> {
    let (dir_path, file_path) = if path.is_absolute() {
        let parent = path
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path}"))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

fn parse_pair<'a>(flag: &'static str, pair: &'a str) -> Result<(&'a str, &'a str), CliError> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(CliError::InvalidPair {
            flag,
            value: pair.to_owned(),
        }),
    }
}

fn write_report(mut target: impl Write, stack_name: &str, report: &DeployReport) {
    write!(target, "{}", report.diff).ok();
    let summary = match report.action {
        DeployAction::Created => format!("created stack {stack_name}"),
        DeployAction::Updated => format!("updated stack {stack_name}"),
        DeployAction::Unchanged if report.strategy == DeploymentStrategy::Skip => {
            format!("stack {stack_name} is up to date")
        }
        DeployAction::Unchanged => format!("stack {stack_name} has no changes to apply"),
    };
    writeln!(target, "{summary}").ok();
    if let Some(stack) = &report.stack {
        write_stack(&mut target, stack);
    }
}

fn write_stack(mut target: impl Write, stack: &Stack) {
    writeln!(target, "{}: {}", stack.name, stack.status).ok();
    if let Some(reason) = &stack.status_reason {
        writeln!(target, "  reason: {reason}").ok();
    }
    for output in &stack.outputs {
        writeln!(target, "  {} = {}", output.key, output.value).ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use stratus::StackStatus;
    use stratus::stack::StackOutput;

    #[rstest]
    #[case("Env=prod", ("Env", "prod"))]
    #[case("Url=https://a=b", ("Url", "https://a=b"))]
    #[case(" Key =", ("Key", ""))]
    fn parse_pair_splits_on_first_equals(#[case] input: &str, #[case] expected: (&str, &str)) {
        let pair = parse_pair("parameter", input).expect("valid pair");
        assert_eq!(pair, expected);
    }

    #[rstest]
    #[case("novalue")]
    #[case("=value")]
    fn parse_pair_rejects_malformed_input(#[case] input: &str) {
        let err = parse_pair("tag", input).expect_err("malformed pair");
        assert!(
            err.to_string().contains("--tag"),
            "error should name the flag: {err}"
        );
    }

    #[test]
    fn write_report_summarises_a_skip() {
        let report = DeployReport {
            action: DeployAction::Unchanged,
            strategy: DeploymentStrategy::Skip,
            diff: stratus::TemplateDiff::default(),
            stack: Some(Stack {
                name: String::from("web"),
                stack_id: None,
                status: StackStatus::UpdateComplete,
                status_reason: None,
                outputs: vec![StackOutput {
                    key: String::from("Url"),
                    value: String::from("https://example.com"),
                    description: None,
                    export_name: None,
                }],
            }),
        };
        let mut buf = Vec::new();
        write_report(&mut buf, "web", &report);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(rendered.contains("stack web is up to date"), "{rendered}");
        assert!(rendered.contains("web: UPDATE_COMPLETE"), "{rendered}");
        assert!(rendered.contains("Url = https://example.com"), "{rendered}");
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::Read {
            path: String::from("missing.json"),
            message: String::from("No such file or directory"),
        };
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(
            rendered.contains("failed to read missing.json"),
            "rendered: {rendered}"
        );
    }
}
