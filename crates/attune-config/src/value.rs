//! Decoded configuration values.

use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::decoder::{DecodeError, LIST_SEPARATOR};

/// A decoded configuration value.
///
/// Choices decode to [`ConfigValue::Str`]. Optional options that resolved to
/// nothing hold [`ConfigValue::Null`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Absent value of an optional option.
    Null,
    /// String (also used for choice literals).
    Str(String),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// JSON object.
    Dict(UnvalidatedDict),
    /// Base64 encoded UTF-8 string, kept encoded.
    Base64(Base64EncodedString),
    /// Filesystem path.
    Path(PathBuf),
    /// Homogeneous list.
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    /// Whether this is [`ConfigValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The float, if this is a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The boolean, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the path, if this is a path.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow the list elements, if this is a list.
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Canonical string form, the inverse of decoding.
    ///
    /// Returns `None` for [`ConfigValue::Null`], which has no encoding.
    ///
    /// # Example
    ///
    /// ```
    /// use attune_config::ConfigValue;
    ///
    /// let value = ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Int(2)]);
    /// assert_eq!(value.encode().as_deref(), Some("1,2"));
    /// ```
    pub fn encode(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Str(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Dict(d) => Some(Value::Object(d.0.clone()).to_string()),
            Self::Base64(b) => Some(b.encoded().to_string()),
            Self::Path(p) => Some(p.to_string_lossy().into_owned()),
            Self::List(items) => Some(
                items
                    .iter()
                    .filter_map(ConfigValue::encode)
                    .collect::<Vec<_>>()
                    .join(&LIST_SEPARATOR.to_string()),
            ),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Some(encoded) => f.write_str(&encoded),
            None => f.write_str("null"),
        }
    }
}

/// A JSON object whose contents are not checked against any schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnvalidatedDict(pub Map<String, Value>);

impl UnvalidatedDict {
    /// Consume into the underlying JSON map.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl Deref for UnvalidatedDict {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Map<String, Value>> for UnvalidatedDict {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A string holding base64 encoded UTF-8 text.
///
/// The encoded form is what gets stored and compared; construction proves it
/// decodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Base64EncodedString {
    encoded: String,
    decoded: String,
}

impl Base64EncodedString {
    /// Validate `encoded` and wrap it.
    ///
    /// # Example
    ///
    /// ```
    /// use attune_config::Base64EncodedString;
    ///
    /// let value = Base64EncodedString::new("dGVzdA==").unwrap();
    /// assert_eq!(value.decoded(), "test");
    /// assert!(Base64EncodedString::new("test").is_err());
    /// ```
    pub fn new(encoded: impl Into<String>) -> Result<Self, DecodeError> {
        let encoded = encoded.into();
        if encoded.is_empty() {
            return Err(DecodeError::Empty);
        }
        let bytes = STANDARD.decode(&encoded)?;
        let decoded = String::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
        Ok(Self { encoded, decoded })
    }

    /// The encoded text.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The decoded UTF-8 text.
    pub fn decoded(&self) -> &str {
        &self.decoded
    }
}

impl fmt::Display for Base64EncodedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<PathBuf> for ConfigValue {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for ConfigValue {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<UnvalidatedDict> for ConfigValue {
    fn from(value: UnvalidatedDict) -> Self {
        Self::Dict(value)
    }
}

impl From<Base64EncodedString> for ConfigValue {
    fn from(value: Base64EncodedString) -> Self {
        Self::Base64(value)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Conversion from a stored [`ConfigValue`] into a Rust type.
pub trait FromConfigValue: Sized {
    /// Name used in [`ConfigError::TypeMismatch`](crate::ConfigError::TypeMismatch).
    const TYPE_NAME: &'static str;

    /// Convert, or `None` if the value has a different shape.
    fn from_config_value(value: &ConfigValue) -> Option<Self>;
}

impl FromConfigValue for ConfigValue {
    const TYPE_NAME: &'static str = "ConfigValue";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromConfigValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromConfigValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromConfigValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromConfigValue for PathBuf {
    const TYPE_NAME: &'static str = "PathBuf";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Path(p) => Some(p.clone()),
            ConfigValue::Str(s) => Some(PathBuf::from(s)),
            _ => None,
        }
    }
}

impl FromConfigValue for UnvalidatedDict {
    const TYPE_NAME: &'static str = "UnvalidatedDict";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Dict(d) => Some(d.clone()),
            _ => None,
        }
    }
}

impl FromConfigValue for Base64EncodedString {
    const TYPE_NAME: &'static str = "Base64EncodedString";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Base64(b) => Some(b.clone()),
            ConfigValue::Str(s) => Base64EncodedString::new(s.as_str()).ok(),
            _ => None,
        }
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    const TYPE_NAME: &'static str = "Vec";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value
            .as_list()?
            .iter()
            .map(T::from_config_value)
            .collect()
    }
}

impl<T: FromConfigValue> FromConfigValue for Option<T> {
    const TYPE_NAME: &'static str = "Option";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Null => Some(None),
            other => T::from_config_value(other).map(Some),
        }
    }
}

macro_rules! impl_from_config_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromConfigValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_config_value(value: &ConfigValue) -> Option<Self> {
                    value.as_int().and_then(|i| <$ty>::try_from(i).ok())
                }
            }
        )*
    };
}

impl_from_config_value_int!(i64, i32, u16, u32, u64, usize);
