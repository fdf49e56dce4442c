//! Selection of the default configuration sources.
//!
//! A [`Config`] built without explicit sources asks [`default_sources`]
//! where to read from on every load. That choice is itself a configuration,
//! read from `ATTUNE_CONFIG_*` environment variables:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `ATTUNE_CONFIG_SOURCE` | one of [`SourceKind`], default `ENVIRONMENT_VARIABLES` |
//! | `ATTUNE_CONFIG_SOURCE_LOCAL_FILE_FILEPATH` | file for `LOCAL_FILE` |
//! | `ATTUNE_CONFIG_SOURCE_REMOTE_HTTP_FILE_URL` | URL for `REMOTE_HTTP_FILE` |
//! | `ATTUNE_CONFIG_SOURCE_REMOTE_HTTP_FILE_TIMEOUT` | seconds, default 10 |
//! | `ATTUNE_CONFIG_SOURCE_REMOTE_HTTP_FILE_AUTHORIZATION_HEADER` | optional `Authorization` header |
//! | `ATTUNE_CONFIG_SOURCE_REMOTE_HTTP_FILE_USER_AGENT_STRING` | default `attune-<version>` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult, ConfigValidationError, SourceError};
use crate::option::option;
use crate::schema::{Config, ConfigSnapshot};
use crate::source::{ConfigSource, EnvironmentVariables, LocalFile, RemoteHttpFile, DEFAULT_USER_AGENT};
use crate::types::ValueType;
use crate::validators::{EnsureFileExists, EnsurePathIsReadable};

/// Prefix of the variables selecting the default sources.
pub const SOURCES_CONFIG_PREFIX: &str = "ATTUNE_CONFIG_";

/// Where configuration is read from by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// [`EnvironmentVariables`].
    EnvironmentVariables,
    /// [`LocalFile`].
    LocalFile,
    /// S3 object. Not implemented.
    S3File,
    /// AWS Secrets Manager secret. Not implemented.
    AwsSecretsManagerSecret,
    /// AWS Parameter Store document. Not implemented.
    AwsParameterStoreDocument,
    /// [`RemoteHttpFile`].
    RemoteHttpFile,
}

impl SourceKind {
    /// Every kind, in the order they are documented.
    pub const ALL: [SourceKind; 6] = [
        Self::EnvironmentVariables,
        Self::LocalFile,
        Self::S3File,
        Self::AwsSecretsManagerSecret,
        Self::AwsParameterStoreDocument,
        Self::RemoteHttpFile,
    ];

    /// The literal used in `ATTUNE_CONFIG_SOURCE`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnvironmentVariables => "ENVIRONMENT_VARIABLES",
            Self::LocalFile => "LOCAL_FILE",
            Self::S3File => "S3_FILE",
            Self::AwsSecretsManagerSecret => "AWS_SECRETS_MANAGER_SECRET",
            Self::AwsParameterStoreDocument => "AWS_PARAMETER_STORE_DOCUMENT",
            Self::RemoteHttpFile => "REMOTE_HTTP_FILE",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SourceError::Unsupported(s.to_string()))
    }
}

/// The loaded `ATTUNE_CONFIG_*` settings.
#[derive(Debug)]
pub struct ConfigSourcesConfig {
    config: Config,
}

impl ConfigSourcesConfig {
    /// Load from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_source(EnvironmentVariables)
    }

    /// Load from an arbitrary source instead of the environment.
    pub fn from_source(source: impl ConfigSource + 'static) -> ConfigResult<Self> {
        let choices = SourceKind::ALL.map(SourceKind::as_str);
        let config = Config::builder("Config Sources")
            .description(
                "Configuration used by config sources to configure their behaviour, \
                 particularly around document sourcing.",
            )
            .prefix(SOURCES_CONFIG_PREFIX)
            .option(
                "SOURCE",
                option()
                    .datatype(ValueType::choice(choices))
                    .default(SourceKind::EnvironmentVariables.as_str())
                    .description("Where configurations will be sourced from."),
            )
            .option(
                "SOURCE_LOCAL_FILE_FILEPATH",
                option()
                    .datatype(ValueType::optional(ValueType::Path))
                    .validator(EnsureFileExists)
                    .validator(EnsurePathIsReadable)
                    .description("File for the LOCAL_FILE config source. Must exist and be readable."),
            )
            .option(
                "SOURCE_REMOTE_HTTP_FILE_URL",
                option()
                    .datatype(ValueType::optional(ValueType::Str))
                    .description("URL for the REMOTE_HTTP_FILE config source."),
            )
            .option(
                "SOURCE_REMOTE_HTTP_FILE_TIMEOUT",
                option()
                    .datatype(ValueType::Int)
                    .default(10)
                    .description("Timeout in seconds for the REMOTE_HTTP_FILE config source."),
            )
            .option(
                "SOURCE_REMOTE_HTTP_FILE_AUTHORIZATION_HEADER",
                option()
                    .datatype(ValueType::optional(ValueType::Str))
                    .sensitive()
                    .description("Authorization header sent to the REMOTE_HTTP_FILE config source."),
            )
            .option(
                "SOURCE_REMOTE_HTTP_FILE_USER_AGENT_STRING",
                option()
                    .datatype(ValueType::Str)
                    .default(DEFAULT_USER_AGENT)
                    .description("User-Agent sent to the REMOTE_HTTP_FILE config source."),
            )
            .validator(require_setting_for(
                SourceKind::LocalFile,
                "SOURCE_LOCAL_FILE_FILEPATH",
            ))
            .validator(require_setting_for(
                SourceKind::RemoteHttpFile,
                "SOURCE_REMOTE_HTTP_FILE_URL",
            ))
            .source(source)
            .build()?;
        Ok(Self { config })
    }

    /// The underlying configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The selected source kind.
    pub fn source_kind(&self) -> ConfigResult<SourceKind> {
        self.config
            .get::<String>("SOURCE")?
            .parse()
            .map_err(|e| ConfigError::source_failed("Config Sources", e))
    }

    /// Build the selected sources.
    ///
    /// # Errors
    ///
    /// [`SourceError::Unsupported`] for the S3 and AWS kinds.
    pub fn sources(&self) -> ConfigResult<Vec<Arc<dyn ConfigSource>>> {
        let kind = self.source_kind()?;
        let source: Arc<dyn ConfigSource> = match kind {
            SourceKind::EnvironmentVariables => Arc::new(EnvironmentVariables),
            SourceKind::LocalFile => {
                let path: PathBuf = self.required("SOURCE_LOCAL_FILE_FILEPATH")?;
                Arc::new(LocalFile::new(path))
            }
            SourceKind::RemoteHttpFile => {
                let url: String = self.required("SOURCE_REMOTE_HTTP_FILE_URL")?;
                let timeout: u64 = self.config.get("SOURCE_REMOTE_HTTP_FILE_TIMEOUT")?;
                let user_agent: String = self.config.get("SOURCE_REMOTE_HTTP_FILE_USER_AGENT_STRING")?;
                let mut remote = RemoteHttpFile::new(url)
                    .map_err(|e| ConfigError::source_failed(kind.as_str(), e))?
                    .with_timeout(Duration::from_secs(timeout))
                    .with_user_agent(user_agent);
                if let Some(header) = self
                    .config
                    .get::<Option<String>>("SOURCE_REMOTE_HTTP_FILE_AUTHORIZATION_HEADER")?
                {
                    remote = remote.with_authorization_header(header);
                }
                Arc::new(remote)
            }
            SourceKind::S3File | SourceKind::AwsSecretsManagerSecret | SourceKind::AwsParameterStoreDocument => {
                return Err(ConfigError::source_failed(
                    kind.as_str(),
                    SourceError::Unsupported(kind.as_str().to_string()),
                ));
            }
        };
        Ok(vec![source])
    }

    fn required<T: crate::value::FromConfigValue>(&self, name: &str) -> ConfigResult<T> {
        self.config
            .get::<Option<T>>(name)?
            .ok_or_else(|| ConfigError::missing_required(format!("{SOURCES_CONFIG_PREFIX}{name}")))
    }
}

/// Sources used by a [`Config`] that declares none.
///
/// Reads the `ATTUNE_CONFIG_*` variables afresh on every call.
pub fn default_sources() -> ConfigResult<Vec<Arc<dyn ConfigSource>>> {
    ConfigSourcesConfig::from_env()?.sources()
}

fn require_setting_for(
    kind: SourceKind,
    setting: &'static str,
) -> impl Fn(&ConfigSnapshot) -> Result<(), ConfigValidationError> + Send + Sync + 'static {
    move |config: &ConfigSnapshot| {
        let selected = config.value("SOURCE").and_then(|v| v.as_str());
        let missing = config.value(setting).map_or(true, |v| v.is_null());
        if selected == Some(kind.as_str()) && missing {
            return Err(ConfigValidationError::new(format!(
                "{SOURCES_CONFIG_PREFIX}{setting} must be set when {SOURCES_CONFIG_PREFIX}SOURCE is {kind}"
            )));
        }
        Ok(())
    }
}
