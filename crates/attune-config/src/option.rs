//! Option declarations.
//!
//! An option starts life as an [`OptionSpec`], produced by [`option()`] and
//! refined with builder methods. It does not know its own name or prefix
//! until the owning [`Config`](crate::Config) is built, at which point it is
//! completed into a [`ConfigOption`].

use std::fmt;
use std::sync::Arc;

use crate::decoder::{self, coerce};
use crate::error::{ConfigError, ConfigResult, SchemaError};
use crate::types::ValueType;
use crate::validators::ConfigValueValidator;
use crate::value::ConfigValue;

/// Name reserved for the schema's own metadata.
pub const RESERVED_OPTION_NAME: &str = "META";

/// Zero-argument default factory, evaluated once when the schema is built.
pub type DefaultFactory = Arc<dyn Fn() -> ConfigValue + Send + Sync>;

#[derive(Clone, Default)]
enum DefaultSpec {
    #[default]
    Unset,
    Value(ConfigValue),
    Factory(DefaultFactory),
}

/// A partially declared option.
///
/// # Example
///
/// ```
/// use attune_config::{option, EnsureDirectoryExists, ValueType};
///
/// let spec = option()
///     .datatype(ValueType::Path)
///     .default("/tmp")
///     .validator(EnsureDirectoryExists)
///     .description("Scratch directory");
/// # let _ = spec;
/// ```
#[derive(Clone, Default)]
pub struct OptionSpec {
    datatype: Option<ValueType>,
    default: DefaultSpec,
    description: Option<String>,
    validators: Vec<Arc<dyn ConfigValueValidator>>,
    sensitive: bool,
}

/// Start declaring an option.
#[must_use]
pub fn option() -> OptionSpec {
    <OptionSpec as Default>::default()
}

impl OptionSpec {
    /// Declare the option's type. Required.
    #[must_use]
    pub fn datatype(mut self, datatype: ValueType) -> Self {
        self.datatype = Some(datatype);
        self
    }

    /// Default used when no source supplies a value.
    ///
    /// Strings are decoded against the declared type when the schema is
    /// built, so `.default("INFO")` works for choices and `.default("/tmp")`
    /// for paths.
    #[must_use]
    pub fn default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = DefaultSpec::Value(value.into());
        self
    }

    /// Default produced by `factory` when the schema is built.
    #[must_use]
    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ConfigValue + Send + Sync + 'static,
    {
        self.default = DefaultSpec::Factory(Arc::new(factory));
        self
    }

    /// Human readable description, used by [`Config::documentation`](crate::Config::documentation).
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a validator. Validators run in the order they were added.
    #[must_use]
    pub fn validator(mut self, validator: impl ConfigValueValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Mark the value as sensitive so it is redacted from docs and debug output.
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Bind the declaration to its name and prefix.
    pub(crate) fn complete(self, name: &str, prefix: &str) -> Result<ConfigOption, SchemaError> {
        if name.eq_ignore_ascii_case(RESERVED_OPTION_NAME) {
            return Err(SchemaError::ReservedName {
                option: name.to_string(),
            });
        }
        if name.is_empty() || name.to_uppercase() != name {
            return Err(SchemaError::NotUppercase {
                name: name.to_string(),
            });
        }
        let datatype = self.datatype.ok_or_else(|| SchemaError::Untyped {
            option: name.to_string(),
        })?;
        if !datatype.is_supported() {
            return Err(SchemaError::UnsupportedType {
                option: name.to_string(),
                value_type: datatype,
            });
        }

        let invalid_default = |reason: String| SchemaError::InvalidDefault {
            option: name.to_string(),
            reason,
        };
        let default = match self.default {
            DefaultSpec::Unset => None,
            DefaultSpec::Value(value) => Some(value),
            DefaultSpec::Factory(factory) => Some(factory()),
        }
        .map(|value| coerce(value, &datatype).map_err(|e| invalid_default(e.to_string())))
        .transpose()?;

        let option = ConfigOption {
            name: name.to_string(),
            prefix: prefix.to_string(),
            fully_qualified_name: format!("{prefix}{name}"),
            datatype,
            default,
            description: self.description,
            validators: self.validators,
            sensitive: self.sensitive,
            hardcoded: false,
            value: None,
        };

        match &option.default {
            Some(ConfigValue::Null) if !option.is_optional() => {
                return Err(invalid_default("null default on a non-optional option".to_string()));
            }
            Some(value) if !value.is_null() => {
                option
                    .run_validators(value)
                    .map_err(|e| invalid_default(e.to_string()))?;
            }
            _ => {}
        }

        Ok(option)
    }
}

/// A declared configuration option and its current value.
#[derive(Clone)]
pub struct ConfigOption {
    name: String,
    prefix: String,
    fully_qualified_name: String,
    datatype: ValueType,
    default: Option<ConfigValue>,
    description: Option<String>,
    validators: Vec<Arc<dyn ConfigValueValidator>>,
    sensitive: bool,
    hardcoded: bool,
    value: Option<ConfigValue>,
}

impl ConfigOption {
    /// Option name without prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix shared by every option of the owning schema.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix followed by name. This is the key looked up in sources.
    pub fn fully_qualified_name(&self) -> &str {
        &self.fully_qualified_name
    }

    /// Declared type.
    pub fn datatype(&self) -> &ValueType {
        &self.datatype
    }

    /// Declared default, already decoded.
    pub fn default(&self) -> Option<&ConfigValue> {
        self.default.as_ref()
    }

    /// Whether a default was declared.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Whether the option accepts `null`.
    pub fn is_optional(&self) -> bool {
        self.datatype.is_optional()
    }

    /// Human readable description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Validators in the order they run.
    pub fn validators(&self) -> &[Arc<dyn ConfigValueValidator>] {
        &self.validators
    }

    /// Whether the value is redacted from docs and debug output.
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Whether the value is locked against loads and plain sets.
    pub fn is_hardcoded(&self) -> bool {
        self.hardcoded
    }

    /// Current value, falling back to the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotLoaded`] when neither a value nor a default is
    /// available.
    pub fn value(&self) -> ConfigResult<&ConfigValue> {
        self.value
            .as_ref()
            .or(self.default.as_ref())
            .ok_or_else(|| ConfigError::NotLoaded {
                option: self.fully_qualified_name.clone(),
            })
    }

    /// Value explicitly stored by a load or set, ignoring the default.
    pub(crate) fn stored_value(&self) -> Option<&ConfigValue> {
        self.value.as_ref()
    }

    /// Store a new value.
    ///
    /// [`ConfigValue::Str`] is treated as an encoded string and decoded
    /// against the declared type. [`ConfigValue::Null`] is accepted only by
    /// optional options. Any other value is trusted as already decoded.
    /// Validators run on every non-null value. A hardcoded option ignores the
    /// call.
    ///
    /// # Errors
    ///
    /// Decode, validation and [`ConfigError::NotOptional`] errors, each naming
    /// the fully-qualified option name. The stored value is unchanged on error.
    pub fn set_value(&mut self, value: ConfigValue) -> ConfigResult<()> {
        if self.hardcoded {
            return Ok(());
        }

        let resolved = match value {
            ConfigValue::Str(raw) => decoder::decode(&raw, &self.datatype)
                .map_err(|e| ConfigError::decode(&self.fully_qualified_name, e))?,
            ConfigValue::Null if !self.is_optional() => {
                return Err(ConfigError::NotOptional {
                    option: self.fully_qualified_name.clone(),
                });
            }
            other => other,
        };

        if !resolved.is_null() {
            self.run_validators(&resolved)
                .map_err(|e| ConfigError::validation(&self.fully_qualified_name, e))?;
        }

        self.value = Some(resolved);
        Ok(())
    }

    /// Store `value` even if the option is locked, then lock it.
    ///
    /// # Errors
    ///
    /// Same as [`set_value`](Self::set_value). On error the lock state is
    /// left as it was.
    pub fn hardcode_value(&mut self, value: ConfigValue) -> ConfigResult<()> {
        let was_hardcoded = self.hardcoded;
        self.hardcoded = false;
        match self.set_value(value) {
            Ok(()) => {
                self.hardcoded = true;
                Ok(())
            }
            Err(e) => {
                self.hardcoded = was_hardcoded;
                Err(e)
            }
        }
    }

    fn run_validators(&self, value: &ConfigValue) -> Result<(), crate::error::ValueValidationError> {
        self.validators
            .iter()
            .try_for_each(|v| v.validate(&self.fully_qualified_name, self, value))
    }
}

impl fmt::Debug for ConfigOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<ConfigValue>| match value {
            Some(_) if self.sensitive => Some("<redacted>".to_string()),
            Some(v) => Some(v.to_string()),
            None => None,
        };
        f.debug_struct("ConfigOption")
            .field("fully_qualified_name", &self.fully_qualified_name)
            .field("datatype", &self.datatype)
            .field("default", &redact(&self.default))
            .field("value", &redact(&self.value))
            .field("validators", &self.validators.len())
            .field("sensitive", &self.sensitive)
            .field("hardcoded", &self.hardcoded)
            .finish()
    }
}

impl fmt::Debug for OptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSpec")
            .field("datatype", &self.datatype)
            .field("has_default", &!matches!(self.default, DefaultSpec::Unset))
            .field("validators", &self.validators.len())
            .field("sensitive", &self.sensitive)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodeError;
    use crate::validators::EnsureFileExists;
    use std::path::PathBuf;

    fn int_option() -> ConfigOption {
        option().datatype(ValueType::Int).complete("PORT", "TEST_").unwrap()
    }

    #[test]
    fn test_fresh_spec_declares_nothing() {
        let spec = option();
        assert!(spec.datatype.is_none());
        assert!(matches!(spec.default, DefaultSpec::Unset));
        assert!(spec.description.is_none());
        assert!(spec.validators.is_empty());
        assert!(!spec.sensitive);
        assert!(matches!(
            spec.complete("PORT", "TEST_"),
            Err(SchemaError::Untyped { .. })
        ));
    }

    #[test]
    fn test_complete_names() {
        let opt = int_option();
        assert_eq!(opt.name(), "PORT");
        assert_eq!(opt.prefix(), "TEST_");
        assert_eq!(opt.fully_qualified_name(), "TEST_PORT");
        assert!(!opt.has_default());
        assert!(!opt.is_optional());
    }

    #[test]
    fn test_schema_errors() {
        assert!(matches!(
            option().complete("PORT", ""),
            Err(SchemaError::Untyped { .. })
        ));
        assert!(matches!(
            option().datatype(ValueType::Str).complete("META", ""),
            Err(SchemaError::ReservedName { .. })
        ));
        assert!(matches!(
            option().datatype(ValueType::Str).complete("meta", ""),
            Err(SchemaError::ReservedName { .. })
        ));
        assert!(matches!(
            option().datatype(ValueType::Str).complete("port", ""),
            Err(SchemaError::NotUppercase { .. })
        ));
        assert!(matches!(
            option()
                .datatype(ValueType::list(ValueType::UnvalidatedDict))
                .complete("DICTS", ""),
            Err(SchemaError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_default_is_decoded_and_checked() {
        let opt = option()
            .datatype(ValueType::choice(["DEBUG", "INFO"]))
            .default("INFO")
            .complete("LEVEL", "")
            .unwrap();
        assert_eq!(opt.value().unwrap(), &ConfigValue::from("INFO"));

        let err = option()
            .datatype(ValueType::choice(["DEBUG", "INFO"]))
            .default("TRACE")
            .complete("LEVEL", "")
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { .. }));

        let err = option()
            .datatype(ValueType::Int)
            .default(ConfigValue::Null)
            .complete("PORT", "")
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { .. }));
    }

    #[test]
    fn test_default_factory() {
        let opt = option()
            .datatype(ValueType::Path)
            .default_with(|| ConfigValue::from(std::env::temp_dir()))
            .complete("TMP", "")
            .unwrap();
        assert_eq!(opt.value().unwrap().as_path(), Some(std::env::temp_dir().as_path()));
    }

    #[test]
    fn test_bad_default_fails_validation() {
        let err = option()
            .datatype(ValueType::Path)
            .default("/nonexistent/file.txt")
            .validator(EnsureFileExists)
            .complete("FILE", "")
            .unwrap_err();
        match err {
            SchemaError::InvalidDefault { reason, .. } => assert!(reason.contains("/nonexistent")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_value_before_load() {
        let opt = int_option();
        assert!(matches!(opt.value(), Err(ConfigError::NotLoaded { .. })));
    }

    #[test]
    fn test_set_value_decodes_strings() {
        let mut opt = int_option();
        opt.set_value(ConfigValue::from("8080")).unwrap();
        assert_eq!(opt.value().unwrap(), &ConfigValue::Int(8080));

        let err = opt.set_value(ConfigValue::from("8080 ")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Decode {
                source: DecodeError::Whitespace,
                ..
            }
        ));
        assert_eq!(opt.value().unwrap(), &ConfigValue::Int(8080));
    }

    #[test]
    fn test_set_value_trusts_decoded_values() {
        let mut opt = int_option();
        opt.set_value(ConfigValue::Int(1)).unwrap();
        assert_eq!(opt.value().unwrap(), &ConfigValue::Int(1));
    }

    #[test]
    fn test_null_requires_optional() {
        let mut opt = int_option();
        assert!(matches!(
            opt.set_value(ConfigValue::Null),
            Err(ConfigError::NotOptional { .. })
        ));

        let mut optional = option()
            .datatype(ValueType::optional(ValueType::Int))
            .complete("PORT", "")
            .unwrap();
        optional.set_value(ConfigValue::Null).unwrap();
        assert!(optional.value().unwrap().is_null());
        optional.set_value(ConfigValue::from("")).unwrap();
        assert!(optional.value().unwrap().is_null());
    }

    #[test]
    fn test_validators_run_on_set() {
        let mut opt = option()
            .datatype(ValueType::Path)
            .validator(EnsureFileExists)
            .complete("FILE", "TEST_")
            .unwrap();
        let err = opt.set_value(ConfigValue::from(PathBuf::from("/nonexistent"))).unwrap_err();
        match err {
            ConfigError::Validation { option, source } => {
                assert_eq!(option, "TEST_FILE");
                assert!(source.message.contains("/nonexistent"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_hardcode_locks_value() {
        let mut opt = int_option();
        opt.hardcode_value(ConfigValue::Int(1)).unwrap();
        assert!(opt.is_hardcoded());

        opt.set_value(ConfigValue::Int(2)).unwrap();
        assert_eq!(opt.value().unwrap(), &ConfigValue::Int(1));

        opt.hardcode_value(ConfigValue::Int(3)).unwrap();
        assert_eq!(opt.value().unwrap(), &ConfigValue::Int(3));
        assert!(opt.is_hardcoded());
    }

    #[test]
    fn test_failed_hardcode_keeps_lock_state() {
        let mut opt = int_option();
        assert!(opt.hardcode_value(ConfigValue::from("nope")).is_err());
        assert!(!opt.is_hardcoded());
    }

    #[test]
    fn test_debug_redacts_sensitive() {
        let mut opt = option()
            .datatype(ValueType::Str)
            .sensitive()
            .complete("TOKEN", "")
            .unwrap();
        opt.set_value(ConfigValue::from("hunter2")).unwrap();
        let debug = format!("{opt:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
