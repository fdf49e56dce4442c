//! Configuration schemas and their loader.
//!
//! A [`Config`] owns a set of [`ConfigOption`]s declared through a
//! [`ConfigBuilder`]. Loading fetches every source, merges them so that the
//! first listed source wins, resolves each option from the merged map (or its
//! default), runs class-level validators and only then publishes the new
//! values. Readers never observe a half-applied load.
//!
//! # Example
//!
//! ```
//! use attune_config::{option, Config, StaticDictionary, ValueType};
//!
//! # fn main() -> Result<(), attune_config::ConfigError> {
//! let config = Config::builder("Database")
//!     .prefix("DB_")
//!     .option("HOST", option().datatype(ValueType::Str))
//!     .option("PORT", option().datatype(ValueType::Int).default(5432))
//!     .source(StaticDictionary::new([("DB_HOST", "localhost")]))
//!     .build()?;
//!
//! assert_eq!(config.get::<String>("HOST")?, "localhost");
//! assert_eq!(config.get::<i64>("PORT")?, 5432);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult, ConfigValidationError, SchemaError, SourceError};
use crate::option::{ConfigOption, OptionSpec};
use crate::source::ConfigSource;
use crate::sources_config::default_sources;
use crate::value::{ConfigValue, FromConfigValue};

/// Raw values starting with this prefix are handed to the [`SecretResolver`].
pub const SECRET_REFERENCE_PREFIX: &str = "secret:";

/// A check over the whole configuration, run after every option resolved.
///
/// Closures taking `&ConfigSnapshot` implement this trait.
pub trait ConfigValidator: Send + Sync {
    /// Accept or reject the candidate values.
    fn validate(&self, config: &ConfigSnapshot) -> Result<(), ConfigValidationError>;
}

impl<F> ConfigValidator for F
where
    F: Fn(&ConfigSnapshot) -> Result<(), ConfigValidationError> + Send + Sync,
{
    fn validate(&self, config: &ConfigSnapshot) -> Result<(), ConfigValidationError> {
        self(config)
    }
}

/// Called once after every committed load, reload or mutation.
///
/// The hook sees the committed values. It must not reload the config that
/// invoked it.
pub trait PostLoadHook: Send + Sync {
    /// React to freshly committed values.
    fn post_load(&self, config: &ConfigSnapshot) -> Result<(), String>;
}

impl<F> PostLoadHook for F
where
    F: Fn(&ConfigSnapshot) -> Result<(), String> + Send + Sync,
{
    fn post_load(&self, config: &ConfigSnapshot) -> Result<(), String> {
        self(config)
    }
}

/// Resolves `secret:<reference>` values into the secret they name.
pub trait SecretResolver: Send + Sync {
    /// Return the secret behind `reference` (the text after `secret:`).
    fn resolve(&self, reference: &str) -> Result<String, String>;
}

impl<F> SecretResolver for F
where
    F: Fn(&str) -> Result<String, String> + Send + Sync,
{
    fn resolve(&self, reference: &str) -> Result<String, String> {
        self(reference)
    }
}

/// An immutable view of every option value at one generation.
#[derive(Clone)]
pub struct ConfigSnapshot {
    config: String,
    prefix: String,
    generation: u64,
    values: IndexMap<String, ConfigValue>,
    sensitive: HashSet<String>,
}

impl ConfigSnapshot {
    fn from_options(
        config: &str,
        prefix: &str,
        generation: u64,
        options: &IndexMap<String, ConfigOption>,
    ) -> ConfigResult<Self> {
        let mut values = IndexMap::with_capacity(options.len());
        let mut sensitive = HashSet::new();
        for (name, option) in options {
            values.insert(name.clone(), option.value()?.clone());
            if option.is_sensitive() {
                sensitive.insert(name.clone());
            }
        }
        Ok(Self {
            config: config.to_string(),
            prefix: prefix.to_string(),
            generation,
            values,
            sensitive,
        })
    }

    /// Name of the configuration.
    pub fn config_name(&self) -> &str {
        &self.config
    }

    /// Generation these values belong to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Value of `name` (with or without prefix).
    pub fn value(&self, name: &str) -> Option<&ConfigValue> {
        self.values.get(name).or_else(|| {
            name.strip_prefix(self.prefix.as_str())
                .and_then(|short| self.values.get(short))
        })
    }

    /// Typed value of `name`.
    pub fn get<T: FromConfigValue>(&self, name: &str) -> ConfigResult<T> {
        let value = self
            .value(name)
            .ok_or_else(|| ConfigError::unknown_option(name, &self.config))?;
        T::from_config_value(value).ok_or_else(|| ConfigError::TypeMismatch {
            option: name.to_string(),
            expected: T::TYPE_NAME,
        })
    }

    /// Option names and values in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the schema declares no options.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.values {
            if self.sensitive.contains(name) {
                map.entry(name, &"<redacted>");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

struct ConfigState {
    options: IndexMap<String, ConfigOption>,
    generation: u64,
    last_loaded_at: Option<DateTime<Utc>>,
    last_load_contained_changes: bool,
}

/// Declares a [`Config`].
#[must_use]
pub struct ConfigBuilder {
    name: String,
    description: Option<String>,
    prefix: String,
    options: Vec<(String, OptionSpec)>,
    sources: Option<Vec<Arc<dyn ConfigSource>>>,
    lazy: bool,
    validators: Vec<Arc<dyn ConfigValidator>>,
    post_load_hook: Option<Arc<dyn PostLoadHook>>,
    secret_resolver: Option<Arc<dyn SecretResolver>>,
}

impl ConfigBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            description: None,
            prefix: String::new(),
            options: Vec::new(),
            sources: None,
            lazy: false,
            validators: Vec::new(),
            post_load_hook: None,
            secret_resolver: None,
        }
    }

    /// Human readable description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Upper case prefix prepended to every option name.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Declare an option. Names must be upper case.
    pub fn option(mut self, name: impl Into<String>, spec: OptionSpec) -> Self {
        self.options.push((name.into(), spec));
        self
    }

    /// Append a source. Earlier sources take precedence over later ones.
    ///
    /// Without any source the list is chosen by
    /// [`ConfigSourcesConfig`](crate::ConfigSourcesConfig) on every load.
    pub fn source(self, source: impl ConfigSource + 'static) -> Self {
        self.shared_source(Arc::new(source))
    }

    /// Append an already shared source.
    pub fn shared_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.sources.get_or_insert_with(Vec::new).push(source);
        self
    }

    /// Defer loading until the first read. Default is to load in [`build`](Self::build).
    pub fn lazy_load(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Append a class-level validator.
    pub fn validator(mut self, validator: impl ConfigValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Install the post-load hook.
    pub fn post_load_hook(mut self, hook: impl PostLoadHook + 'static) -> Self {
        self.post_load_hook = Some(Arc::new(hook));
        self
    }

    /// Install a resolver for `secret:` references.
    pub fn secret_resolver(mut self, resolver: impl SecretResolver + 'static) -> Self {
        self.secret_resolver = Some(Arc::new(resolver));
        self
    }

    /// Complete every option and, unless lazy, load.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Schema`] for a malformed declaration, or any load error
    /// when loading eagerly.
    pub fn build(self) -> ConfigResult<Config> {
        if self.prefix.to_uppercase() != self.prefix {
            return Err(SchemaError::NotUppercase { name: self.prefix }.into());
        }

        let mut options = IndexMap::with_capacity(self.options.len());
        for (name, spec) in self.options {
            if options.contains_key(&name) {
                return Err(SchemaError::DuplicateOption { option: name }.into());
            }
            let option = spec.complete(&name, &self.prefix)?;
            options.insert(name, option);
        }

        let config = Config {
            name: self.name,
            description: self.description,
            prefix: self.prefix,
            sources: self.sources,
            lazy: self.lazy,
            validators: self.validators,
            post_load_hook: self.post_load_hook,
            secret_resolver: self.secret_resolver,
            state: RwLock::new(ConfigState {
                options,
                generation: 0,
                last_loaded_at: None,
                last_load_contained_changes: false,
            }),
            load_lock: Mutex::new(()),
            loaded: AtomicBool::new(false),
        };

        if !config.lazy {
            config.reload_config()?;
        }
        Ok(config)
    }
}

/// A configuration schema together with its current values.
///
/// `Config` is `Send + Sync`; share it behind an `Arc`. Every mutation
/// (load, reload, set, hardcode) is serialised and published atomically.
pub struct Config {
    name: String,
    description: Option<String>,
    prefix: String,
    sources: Option<Vec<Arc<dyn ConfigSource>>>,
    lazy: bool,
    validators: Vec<Arc<dyn ConfigValidator>>,
    post_load_hook: Option<Arc<dyn PostLoadHook>>,
    secret_resolver: Option<Arc<dyn SecretResolver>>,
    state: RwLock<ConfigState>,
    load_lock: Mutex<()>,
    loaded: AtomicBool,
}

impl Config {
    /// Start declaring a configuration called `name`.
    pub fn builder(name: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(name.into())
    }

    /// Configuration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Prefix shared by every option.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether loading waits for the first read.
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Whether at least one load has committed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Counter bumped by every commit. Zero before the first load.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// When the last commit happened.
    pub fn last_loaded_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_loaded_at
    }

    /// Whether the last commit changed any value.
    pub fn last_load_contained_changes(&self) -> bool {
        self.state.read().last_load_contained_changes
    }

    /// Declared option names, in declaration order.
    pub fn option_names(&self) -> Vec<String> {
        self.state.read().options.keys().cloned().collect()
    }

    /// A copy of the option `name` (with or without prefix).
    pub fn get_config_option(&self, name: &str) -> ConfigResult<ConfigOption> {
        self.ensure_loaded()?;
        let state = self.state.read();
        let key = self.resolve_key(&state.options, name)?;
        Ok(state.options[key.as_str()].clone())
    }

    /// Current value of `name`, loading first if needed.
    pub fn value(&self, name: &str) -> ConfigResult<ConfigValue> {
        self.ensure_loaded()?;
        let state = self.state.read();
        let key = self.resolve_key(&state.options, name)?;
        state.options[key.as_str()].value().cloned()
    }

    /// Current value of `name` converted to `T`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::TypeMismatch`] when the stored value does not convert.
    pub fn get<T: FromConfigValue>(&self, name: &str) -> ConfigResult<T> {
        self.ensure_loaded()?;
        let state = self.state.read();
        let key = self.resolve_key(&state.options, name)?;
        let option = &state.options[key.as_str()];
        T::from_config_value(option.value()?).ok_or_else(|| ConfigError::TypeMismatch {
            option: option.fully_qualified_name().to_string(),
            expected: T::TYPE_NAME,
        })
    }

    /// Every current value, loading first if needed.
    pub fn snapshot(&self) -> ConfigResult<ConfigSnapshot> {
        self.ensure_loaded()?;
        let state = self.state.read();
        ConfigSnapshot::from_options(&self.name, &self.prefix, state.generation, &state.options)
    }

    /// Load again from every source.
    ///
    /// On error the previously committed values stay in place.
    pub fn reload_config(&self) -> ConfigResult<()> {
        let _guard = self.load_lock.lock();
        self.load_locked()
    }

    /// Set one option, then re-run class validators and the post-load hook.
    ///
    /// A string is decoded against the option's type. Hardcoded options
    /// ignore the call.
    pub fn set_config_value(&self, name: &str, value: impl Into<ConfigValue>) -> ConfigResult<()> {
        let value = value.into();
        self.mutate(name, |option| option.set_value(value))
    }

    /// Set one option and lock it against every later load and set.
    pub fn hardcode_config_value(&self, name: &str, value: impl Into<ConfigValue>) -> ConfigResult<()> {
        let value = value.into();
        self.mutate(name, |option| option.hardcode_value(value))
    }

    /// Plain-text reference of the schema. Sensitive defaults are redacted.
    pub fn documentation(&self) -> String {
        let state = self.state.read();
        let mut lines = vec![self.name.clone()];
        if let Some(description) = &self.description {
            lines.push(description.clone());
        }
        for option in state.options.values() {
            lines.push(String::new());
            lines.push(format!("{} ({})", option.fully_qualified_name(), option.datatype()));
            if let Some(description) = option.description() {
                lines.push(format!("    {description}"));
            }
            let default = match option.default() {
                Some(_) if option.is_sensitive() => "<redacted>".to_string(),
                Some(value) => value.to_string(),
                None if option.is_optional() => "null".to_string(),
                None => "required".to_string(),
            };
            lines.push(format!("    default: {default}"));
        }
        lines.push(String::new());
        lines.join("\n")
    }

    /// Write the current values as a `KEY=VALUE` document. Null values are
    /// omitted.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        self.ensure_loaded()?;
        let mut document = String::new();
        {
            let state = self.state.read();
            for option in state.options.values() {
                if let Some(encoded) = option.value()?.encode() {
                    document.push_str(option.fully_qualified_name());
                    document.push('=');
                    document.push_str(&encoded);
                    document.push('\n');
                }
            }
        }
        fs::write(path, document)?;
        Ok(())
    }

    fn ensure_loaded(&self) -> ConfigResult<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let _guard = self.load_lock.lock();
        if self.is_loaded() {
            return Ok(());
        }
        self.load_locked()
    }

    fn mutate<F>(&self, name: &str, apply: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut ConfigOption) -> ConfigResult<()>,
    {
        self.ensure_loaded()?;
        let _guard = self.load_lock.lock();
        let mut scratch = self.state.read().options.clone();
        let key = self.resolve_key(&scratch, name)?;
        if let Some(option) = scratch.get_mut(key.as_str()) {
            apply(option)?;
        }
        self.commit(scratch)
    }

    fn load_locked(&self) -> ConfigResult<()> {
        let raw = self.fetch_merged()?;
        let mut scratch = self.state.read().options.clone();

        if !self.prefix.is_empty() {
            let known: HashSet<String> = scratch
                .values()
                .map(|o| o.fully_qualified_name().to_lowercase())
                .collect();
            for key in raw.keys().filter(|k| !known.contains(*k)) {
                debug!(config = %self.name, key = %key, "ignoring unknown configuration key");
            }
        }

        for option in scratch.values_mut() {
            if option.is_hardcoded() {
                continue;
            }
            let key = option.fully_qualified_name().to_lowercase();
            if let Some(raw) = raw.get(&key) {
                let raw = self.resolve_secret(option.fully_qualified_name(), raw)?;
                option.set_value(ConfigValue::Str(raw))?;
            } else if let Some(default) = option.default().cloned() {
                option.set_value(default)?;
            } else if option.is_optional() {
                option.set_value(ConfigValue::Null)?;
            } else {
                return Err(ConfigError::missing_required(option.fully_qualified_name()));
            }
        }

        self.commit(scratch)
    }

    fn fetch_merged(&self) -> ConfigResult<HashMap<String, String>> {
        let resolved;
        let sources = match &self.sources {
            Some(sources) => sources,
            None => {
                resolved = default_sources()?;
                &resolved
            }
        };

        let mut merged = HashMap::new();
        for source in sources.iter().rev() {
            let values = source
                .fetch(&self.prefix)
                .map_err(|e| ConfigError::source_failed(source.name(), e))?;
            debug!(config = %self.name, source = source.name(), keys = values.len(), "fetched configuration source");
            merged.extend(values.into_iter().map(|(k, v)| (k.to_lowercase(), v)));
        }
        Ok(merged)
    }

    fn resolve_secret(&self, option: &str, raw: &str) -> ConfigResult<String> {
        match (raw.strip_prefix(SECRET_REFERENCE_PREFIX), &self.secret_resolver) {
            (Some(reference), Some(resolver)) => resolver.resolve(reference).map_err(|message| {
                ConfigError::source_failed(
                    "Secret Resolver",
                    SourceError::connection(format!("{option}: {message}")),
                )
            }),
            _ => Ok(raw.to_string()),
        }
    }

    fn commit(&self, options: IndexMap<String, ConfigOption>) -> ConfigResult<()> {
        let generation = self.state.read().generation + 1;
        let snapshot = ConfigSnapshot::from_options(&self.name, &self.prefix, generation, &options)?;
        for validator in &self.validators {
            validator.validate(&snapshot)?;
        }

        let changed = {
            let mut state = self.state.write();
            let changed = !self.is_loaded()
                || state
                    .options
                    .values()
                    .zip(options.values())
                    .any(|(old, new)| old.stored_value() != new.stored_value());
            state.options = options;
            state.generation = generation;
            state.last_loaded_at = Some(Utc::now());
            state.last_load_contained_changes = changed;
            changed
        };
        self.loaded.store(true, Ordering::Release);
        info!(config = %self.name, generation, changed, "configuration loaded");

        if let Some(hook) = &self.post_load_hook {
            hook.post_load(&snapshot)
                .map_err(|message| ConfigError::hook(&self.name, message))?;
        }
        Ok(())
    }

    fn resolve_key(&self, options: &IndexMap<String, ConfigOption>, name: &str) -> ConfigResult<String> {
        if options.contains_key(name) {
            return Ok(name.to_string());
        }
        name.strip_prefix(self.prefix.as_str())
            .filter(|short| options.contains_key(*short))
            .map(str::to_string)
            .ok_or_else(|| ConfigError::unknown_option(name, &self.name))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("options", &state.options.values().collect::<Vec<_>>())
            .field("sources", &self.sources)
            .field("lazy", &self.lazy)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}
