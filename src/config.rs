//! Configuration loading via `ortho-config`.
//!
//! Credentials and region come from the standard `AWS_*` variables;
//! deployment behaviour comes from `STRATUS_*` variables. Both may also be
//! set in `stratus.toml`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::signer::{AwsClient, Credentials, RequestSigner, SigningError, TransportError};

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Credentials, region, and endpoint for AWS API calls.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "AWS",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct AwsConfig {
    /// Access key identifier. Required.
    pub access_key_id: Option<String>,
    /// Secret access key. Required.
    pub secret_access_key: Option<String>,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
    /// Target region. Defaults to `us-east-1`.
    #[ortho_config(default = DEFAULT_REGION.to_owned())]
    pub region: String,
    /// Endpoint override, for example a local emulator.
    pub endpoint_url: Option<String>,
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

/// Polling and safety settings for deployments.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STRATUS",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct DeployConfig {
    /// Seconds between stack status queries.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Number of status queries before a wait times out.
    #[ortho_config(default = 120)]
    pub max_attempts: u32,
    /// Whether changes that delete or replace resources may proceed.
    #[ortho_config(default = false)]
    pub allow_destructive: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }

    fn guidance(&self, problem: &str) -> String {
        format!(
            "{problem} {}: set {} or add {} to [{}] in stratus.toml",
            self.description, self.env_var, self.toml_key, self.section
        )
    }
}

const ACCESS_KEY_FIELD: FieldMetadata =
    FieldMetadata::new("AWS access key ID", "AWS_ACCESS_KEY_ID", "access_key_id", "aws");
const SECRET_KEY_FIELD: FieldMetadata = FieldMetadata::new(
    "AWS secret access key",
    "AWS_SECRET_ACCESS_KEY",
    "secret_access_key",
    "aws",
);
const REGION_FIELD: FieldMetadata = FieldMetadata::new("AWS region", "AWS_REGION", "region", "aws");
const MAX_ATTEMPTS_FIELD: FieldMetadata = FieldMetadata::new(
    "status query budget",
    "STRATUS_MAX_ATTEMPTS",
    "max_attempts",
    "stratus",
);
const POLL_INTERVAL_FIELD: FieldMetadata = FieldMetadata::new(
    "poll interval",
    "STRATUS_POLL_INTERVAL_SECS",
    "poll_interval_secs",
    "stratus",
);

fn require_field<'a>(
    value: Option<&'a str>,
    metadata: &FieldMetadata,
) -> Result<&'a str, ConfigError> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(ConfigError::MissingField(metadata.guidance("missing"))),
    }
}

impl AwsConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and TOML key of the first missing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(self.access_key_id.as_deref(), &ACCESS_KEY_FIELD)?;
        require_field(self.secret_access_key.as_deref(), &SECRET_KEY_FIELD)?;
        require_field(Some(self.region.as_str()), &REGION_FIELD)?;
        Ok(())
    }

    /// Builds signing credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a key is absent.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let access = require_field(self.access_key_id.as_deref(), &ACCESS_KEY_FIELD)?;
        let secret = require_field(self.secret_access_key.as_deref(), &SECRET_KEY_FIELD)?;
        Ok(Credentials::new(access, secret, self.session_token.clone())?)
    }

    /// Builds a signer for `service` in the configured region.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when credentials or the region are missing.
    pub fn signer(&self, service: &str) -> Result<RequestSigner, ConfigError> {
        self.validate()?;
        Ok(RequestSigner::new(
            self.credentials()?,
            service,
            self.region.trim(),
        )?)
    }

    /// Builds a client for `service`, honouring the endpoint override.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the signer cannot be built or the
    /// endpoint is invalid.
    pub fn client(&self, service: &str) -> Result<AwsClient, ConfigError> {
        let signer = self.signer(service)?;
        Ok(AwsClient::new(signer, self.endpoint_url.as_deref())?)
    }
}

impl DeployConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects a zero poll interval or attempt budget.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                MAX_ATTEMPTS_FIELD.guidance("zero is not a valid"),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                POLL_INTERVAL_FIELD.guidance("zero is not a valid"),
            ));
        }
        Ok(())
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<SigningError> for ConfigError {
    fn from(value: SigningError) -> Self {
        Self::Invalid(value.to_string())
    }
}

impl From<TransportError> for ConfigError {
    fn from(value: TransportError) -> Self {
        Self::Invalid(value.to_string())
    }
}
