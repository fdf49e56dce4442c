//! Typed configuration schemas for Attune.
//!
//! This crate declares configuration as explicit schemas and fills them from
//! pluggable sources:
//! - environment variables, local `KEY=VALUE` files and remote HTTP documents
//! - strict decoding of every raw string into its declared type
//! - per-value validators and whole-config validators
//! - eager or lazy loading, atomic reloads and hardcoded overrides
//!
//! # Overview
//!
//! A [`Config`] is declared with [`Config::builder`]. Each option is declared
//! with [`option()`] and a [`ValueType`]:
//!
//! - primitives: [`ValueType::Str`], [`ValueType::Int`], [`ValueType::Float`],
//!   [`ValueType::Bool`], [`ValueType::Path`]
//! - [`ValueType::UnvalidatedDict`] for JSON objects and
//!   [`ValueType::Base64EncodedString`] for base64 text
//! - [`ValueType::Choice`] for a closed set of upper case literals
//! - [`ValueType::List`] and [`ValueType::Optional`] around the above
//!
//! Sources are consulted in order; the first one that defines a key wins.
//! Keys are compared case-insensitively as `PREFIX` + `NAME`.
//!
//! # Example
//!
//! ```
//! use attune_config::{option, Config, EnvironmentVariables, StaticDictionary, ValueType};
//!
//! # fn main() -> Result<(), attune_config::ConfigError> {
//! let logging = Config::builder("Logging")
//!     .description("Log output settings.")
//!     .prefix("ATTUNE_EXAMPLE_LOG_")
//!     .option(
//!         "LEVEL",
//!         option()
//!             .datatype(ValueType::choice(["DEBUG", "INFO", "WARNING"]))
//!             .default("INFO"),
//!     )
//!     .option("TARGETS", option().datatype(ValueType::list(ValueType::Str)))
//!     .option("FILE", option().datatype(ValueType::optional(ValueType::Path)))
//!     .source(EnvironmentVariables)
//!     .source(StaticDictionary::new([("ATTUNE_EXAMPLE_LOG_TARGETS", "stdout,journal,")]))
//!     .build()?;
//!
//! assert_eq!(logging.get::<Vec<String>>("TARGETS")?, ["stdout", "journal"]);
//! assert!(logging.get::<Option<std::path::PathBuf>>("FILE")?.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! # Document Format
//!
//! Local and remote files hold one entry per line, split on the first `=`:
//!
//! ```text
//! LOG_LEVEL=DEBUG
//! LOG_TARGETS=stdout,journal
//! DB_URL=postgres://db/app?sslmode=require
//! ```
//!
//! # Default Sources
//!
//! A config declared without sources reads them from [`ConfigSourcesConfig`],
//! which is driven by `ATTUNE_CONFIG_*` environment variables.

mod decoder;
mod error;
mod option;
mod schema;
mod source;
mod sources_config;
mod types;
mod validators;
mod value;
mod watcher;

pub use decoder::{decode, decode_optional, DecodeError, LIST_SEPARATOR};
pub use error::{
    ConfigError, ConfigResult, ConfigValidationError, SchemaError, SourceError, ValueValidationError,
};
pub use option::{option, ConfigOption, DefaultFactory, OptionSpec, RESERVED_OPTION_NAME};
pub use schema::{
    Config, ConfigBuilder, ConfigSnapshot, ConfigValidator, PostLoadHook, SecretResolver,
    SECRET_REFERENCE_PREFIX,
};
pub use source::{
    filter_prefix, parse_document, ConfigSource, EnvironmentVariables, FileObject, LocalFile,
    RemoteHttpFile, StaticDictionary, DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT, KEY_VALUE_SEPARATOR,
    LINE_SEPARATOR,
};
pub use sources_config::{default_sources, ConfigSourcesConfig, SourceKind, SOURCES_CONFIG_PREFIX};
pub use types::{type_is_supported, ValueType};
pub use validators::{
    ConfigValueValidator, EnsureDirectoryExists, EnsureFileExists, EnsureFileHasExtension,
    EnsurePathIsExecutable, EnsurePathIsReadable, EnsurePathIsWritable,
};
pub use value::{Base64EncodedString, ConfigValue, FromConfigValue, UnvalidatedDict};
pub use watcher::{FileChangeEvent, FileChangeKind, FileWatcher, FileWatcherBuilder};
