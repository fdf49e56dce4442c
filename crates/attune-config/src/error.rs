//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::decoder::DecodeError;
use crate::types::ValueType;

/// Result alias used throughout the crate.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while declaring, loading or mutating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The schema itself is malformed. Raised at declaration time.
    #[error("invalid configuration schema: {0}")]
    Schema(#[from] SchemaError),

    /// A configuration source could not be read.
    #[error("config source {source_name} failed: {source}")]
    Source {
        /// Name of the failing source.
        source_name: String,
        /// Underlying source error.
        #[source]
        source: SourceError,
    },

    /// A raw value does not match the grammar of its declared type.
    #[error("failed to decode config option {option}: {source}")]
    Decode {
        /// Fully-qualified option name.
        option: String,
        /// Underlying decode error.
        #[source]
        source: DecodeError,
    },

    /// A decoded value was rejected by one of the option's validators.
    #[error("config option {option} failed validation: {source}")]
    Validation {
        /// Fully-qualified option name.
        option: String,
        /// Underlying validation error.
        #[source]
        source: ValueValidationError,
    },

    /// No source provided a value and the option has no default and is not optional.
    #[error("required config option {option} with no default was not set")]
    MissingRequired {
        /// Fully-qualified option name.
        option: String,
    },

    /// A class-level validator rejected the configuration as a whole.
    #[error(transparent)]
    ConfigValidation(#[from] ConfigValidationError),

    /// The option is not declared on the schema.
    #[error("config option {option} is not declared on {config}")]
    UnknownOption {
        /// Requested option name.
        option: String,
        /// Name of the configuration.
        config: String,
    },

    /// Attempted to set `null` on an option that is not optional.
    #[error("config option {option} is not optional")]
    NotOptional {
        /// Fully-qualified option name.
        option: String,
    },

    /// The option was read before any value or default was available.
    #[error("config option {option} read before it was loaded")]
    NotLoaded {
        /// Fully-qualified option name.
        option: String,
    },

    /// The stored value cannot be converted into the requested Rust type.
    #[error("config option {option} does not hold a value of type {expected}")]
    TypeMismatch {
        /// Fully-qualified option name.
        option: String,
        /// Name of the requested Rust type.
        expected: &'static str,
    },

    /// The post-load hook failed.
    #[error("post-load hook for {config} failed: {message}")]
    Hook {
        /// Name of the configuration.
        config: String,
        /// Failure reported by the hook.
        message: String,
    },

    /// The file watcher could not be set up.
    #[error("file watcher error: {message}")]
    Watch {
        /// Description of the failure.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create a new source error.
    pub fn source_failed(source_name: impl Into<String>, source: SourceError) -> Self {
        Self::Source {
            source_name: source_name.into(),
            source,
        }
    }

    /// Create a new decode error.
    pub fn decode(option: impl Into<String>, source: DecodeError) -> Self {
        Self::Decode {
            option: option.into(),
            source,
        }
    }

    /// Create a new value validation error.
    pub fn validation(option: impl Into<String>, source: ValueValidationError) -> Self {
        Self::Validation {
            option: option.into(),
            source,
        }
    }

    /// Create a new missing required option error.
    pub fn missing_required(option: impl Into<String>) -> Self {
        Self::MissingRequired {
            option: option.into(),
        }
    }

    /// Create a new unknown option error.
    pub fn unknown_option(option: impl Into<String>, config: impl Into<String>) -> Self {
        Self::UnknownOption {
            option: option.into(),
            config: config.into(),
        }
    }

    /// Create a new watcher error.
    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch {
            message: message.into(),
        }
    }

    /// Create a new hook error.
    pub fn hook(config: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            config: config.into(),
            message: message.into(),
        }
    }
}

/// Schema declaration errors. These are never recovered from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The option was declared without a type.
    #[error("{option} is untyped, declare its type")]
    Untyped {
        /// Option name.
        option: String,
    },

    /// The option uses a name the schema reserves for itself.
    #[error("`{option}` is a reserved name and cannot be used as a configuration option")]
    ReservedName {
        /// Option name.
        option: String,
    },

    /// The declared type is outside the supported set.
    #[error("{option}: type {value_type} is not supported")]
    UnsupportedType {
        /// Option name.
        option: String,
        /// Rejected type.
        value_type: ValueType,
    },

    /// Prefix or option name is not upper case.
    #[error("{name} must be upper case")]
    NotUppercase {
        /// Offending prefix or option name.
        name: String,
    },

    /// Two options share the same name.
    #[error("{option} is declared more than once")]
    DuplicateOption {
        /// Option name.
        option: String,
    },

    /// The default does not fit the declared type or fails validation.
    #[error("invalid default for {option}: {reason}")]
    InvalidDefault {
        /// Option name.
        option: String,
        /// Why the default was rejected.
        reason: String,
    },
}

/// Errors raised by a [`ConfigSource`](crate::ConfigSource).
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source exists but cannot be read.
    #[error("permission denied: {message}")]
    Permission {
        /// Description of the failure.
        message: String,
    },

    /// A networked source is unreachable.
    #[error("connection failed: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// The underlying document is malformed.
    #[error("malformed document: {message}")]
    Parse {
        /// Description of the failure.
        message: String,
    },

    /// The file backing the source does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// The URL of a remote source is not usable.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The source kind has no implementation.
    #[error("config source {0} is not supported")]
    Unsupported(String),
}

impl SourceError {
    /// Create a new permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

/// A decoded value failed a [`ConfigValueValidator`](crate::ConfigValueValidator).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValueValidationError {
    /// Name of the validator that failed.
    pub validator: String,
    /// Human readable reason.
    pub message: String,
}

impl ValueValidationError {
    /// Create a new value validation error.
    pub fn new(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            message: message.into(),
        }
    }
}

/// A class-level [`ConfigValidator`](crate::ConfigValidator) rejected the configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("configuration validation failed: {0}")]
pub struct ConfigValidationError(pub String);

impl ConfigValidationError {
    /// Create a new configuration validation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
