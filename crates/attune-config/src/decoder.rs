//! String decoding.
//!
//! Every raw value arrives as a string. [`decode`] turns it into a
//! [`ConfigValue`] according to the declared [`ValueType`], or fails without
//! producing a partial value.
//!
//! The rules per type:
//!
//! | Type | Accepted input |
//! |------|----------------|
//! | `str` | any non-empty string, kept verbatim |
//! | `int`, `float` | strict parse, surrounding whitespace is an error |
//! | `bool` | `true/yes/y/1/on` or `false/no/n/0/off`, trimmed, case-insensitive |
//! | `dict` | a JSON object |
//! | `base64` | non-empty standard base64 that decodes to UTF-8, kept encoded |
//! | `path` | any non-empty string |
//! | `choice` | exactly one of the declared literals, after trimming |
//! | `list[T]` | comma separated `T`s; surrounding commas and whitespace are dropped, each element is trimmed |
//! | `optional[T]` | empty or absent means `null`, anything else decodes as `T` |

use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

use crate::types::ValueType;
use crate::value::{Base64EncodedString, ConfigValue, UnvalidatedDict};

/// Separator between list elements. There is no escaping.
pub const LIST_SEPARATOR: char = ',';

/// A raw string does not match the grammar of its declared type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Empty input where a value is required.
    #[error("value is empty")]
    Empty,

    /// Numeric input with surrounding whitespace.
    #[error("leading or trailing whitespace detected")]
    Whitespace,

    /// Not an integer.
    #[error("invalid integer: {0}")]
    Int(#[from] ParseIntError),

    /// Not a float.
    #[error("invalid float: {0}")]
    Float(#[from] ParseFloatError),

    /// Not one of the boolean tokens.
    #[error("invalid boolean {0:?}, expected one of true/yes/y/1/on or false/no/n/0/off")]
    Bool(String),

    /// Malformed JSON.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// Well-formed JSON that is not an object.
    #[error("JSON value is not an object")]
    NotAnObject,

    /// Malformed base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Base64 payload is not UTF-8.
    #[error("base64 payload is not valid UTF-8")]
    NotUtf8,

    /// Input is not one of the declared literals.
    #[error("{value:?} is not one of {choices}", choices = options.join(", "))]
    NotAChoice {
        /// Rejected input.
        value: String,
        /// Declared literals.
        options: Vec<String>,
    },

    /// Nothing left after stripping separators and whitespace.
    #[error("list is empty")]
    EmptyList,

    /// One list element failed to decode.
    #[error("list element {index}: {source}")]
    ListElement {
        /// Zero-based element index.
        index: usize,
        /// Why the element failed.
        #[source]
        source: Box<DecodeError>,
    },

    /// The declared type is outside the supported set.
    #[error("type {0} is not supported")]
    Unsupported(ValueType),
}

/// Decode `raw` as `value_type`.
///
/// # Example
///
/// ```
/// use attune_config::{decode, ConfigValue, ValueType};
///
/// let value = decode("a,b,", &ValueType::list(ValueType::Str)).unwrap();
/// assert_eq!(value, ConfigValue::from(vec!["a", "b"]));
/// assert!(decode("5 ", &ValueType::Int).is_err());
/// ```
pub fn decode(raw: &str, value_type: &ValueType) -> Result<ConfigValue, DecodeError> {
    if !value_type.is_supported() {
        return Err(DecodeError::Unsupported(value_type.clone()));
    }
    decode_supported(raw, value_type)
}

/// Decode a possibly absent raw value.
///
/// Absence maps to [`ConfigValue::Null`] for optional types and is
/// [`DecodeError::Empty`] otherwise.
pub fn decode_optional(raw: Option<&str>, value_type: &ValueType) -> Result<ConfigValue, DecodeError> {
    match raw {
        Some(raw) => decode(raw, value_type),
        None if value_type.is_optional() => Ok(ConfigValue::Null),
        None => Err(DecodeError::Empty),
    }
}

/// Normalize a declared value against its type.
///
/// Strings (including list elements) are decoded, so `"INFO"` is checked
/// against a choice set and `"/tmp"` becomes a path. Everything else is kept.
pub(crate) fn coerce(value: ConfigValue, value_type: &ValueType) -> Result<ConfigValue, DecodeError> {
    match (value, value_type.inner()) {
        (ConfigValue::Str(raw), _) => decode(&raw, value_type),
        (ConfigValue::List(items), ValueType::List(element)) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                ConfigValue::Str(raw) => {
                    decode_scalar(&raw, element).map_err(|e| list_element_error(index, e))
                }
                other => Ok(other),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ConfigValue::List),
        (other, _) => Ok(other),
    }
}

fn decode_supported(raw: &str, value_type: &ValueType) -> Result<ConfigValue, DecodeError> {
    match value_type {
        ValueType::Optional(inner) => {
            if raw.is_empty() {
                Ok(ConfigValue::Null)
            } else {
                decode_supported(raw, inner)
            }
        }
        ValueType::List(element) => decode_list(raw, element),
        scalar => decode_scalar(raw, scalar),
    }
}

fn decode_list(raw: &str, element: &ValueType) -> Result<ConfigValue, DecodeError> {
    let stripped = raw.trim_matches(|c: char| c == LIST_SEPARATOR || c.is_whitespace());
    if stripped.is_empty() {
        return Err(DecodeError::EmptyList);
    }

    stripped
        .split(LIST_SEPARATOR)
        .enumerate()
        .map(|(index, item)| {
            decode_scalar(item.trim(), element).map_err(|e| list_element_error(index, e))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ConfigValue::List)
}

fn decode_scalar(raw: &str, value_type: &ValueType) -> Result<ConfigValue, DecodeError> {
    match value_type {
        ValueType::Str => {
            if raw.is_empty() {
                return Err(DecodeError::Empty);
            }
            Ok(ConfigValue::Str(raw.to_string()))
        }
        ValueType::Int => Ok(ConfigValue::Int(strict(raw)?.parse()?)),
        ValueType::Float => Ok(ConfigValue::Float(strict(raw)?.parse()?)),
        ValueType::Bool => decode_bool(raw).map(ConfigValue::Bool),
        ValueType::UnvalidatedDict => {
            let value: Value =
                serde_json::from_str(raw.trim()).map_err(|e| DecodeError::Json(e.to_string()))?;
            match value {
                Value::Object(map) => Ok(ConfigValue::Dict(UnvalidatedDict(map))),
                _ => Err(DecodeError::NotAnObject),
            }
        }
        ValueType::Base64EncodedString => {
            Base64EncodedString::new(raw.trim()).map(ConfigValue::Base64)
        }
        ValueType::Path => {
            if raw.is_empty() {
                return Err(DecodeError::Empty);
            }
            Ok(ConfigValue::Path(PathBuf::from(raw)))
        }
        ValueType::Choice(options) => {
            let candidate = raw.trim();
            if options.iter().any(|o| o == candidate) {
                Ok(ConfigValue::Str(candidate.to_string()))
            } else {
                Err(DecodeError::NotAChoice {
                    value: candidate.to_string(),
                    options: options.clone(),
                })
            }
        }
        ValueType::List(_) | ValueType::Optional(_) => {
            Err(DecodeError::Unsupported(value_type.clone()))
        }
    }
}

fn strict(raw: &str) -> Result<&str, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    if raw.trim() != raw {
        return Err(DecodeError::Whitespace);
    }
    Ok(raw)
}

fn decode_bool(raw: &str) -> Result<bool, DecodeError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "no" | "n" | "0" | "off" => Ok(false),
        _ => Err(DecodeError::Bool(raw.to_string())),
    }
}

fn list_element_error(index: usize, source: DecodeError) -> DecodeError {
    DecodeError::ListElement {
        index,
        source: Box::new(source),
    }
}
