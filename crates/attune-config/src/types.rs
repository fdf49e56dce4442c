//! Declared option types.
//!
//! A [`ValueType`] describes the shape an option's raw string must decode
//! into. The set of shapes is closed: anything [`ValueType::is_supported`]
//! rejects is refused when the schema is declared.

use std::fmt;

/// The declared type of a configuration option.
///
/// # Example
///
/// ```
/// use attune_config::ValueType;
///
/// let levels = ValueType::optional(ValueType::list(ValueType::choice(["DEBUG", "INFO"])));
/// assert!(levels.is_supported());
/// assert!(levels.is_optional());
/// assert_eq!(levels.to_string(), "optional[list[choice[DEBUG, INFO]]]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Non-empty string.
    Str,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Boolean.
    Bool,
    /// Arbitrary JSON object.
    UnvalidatedDict,
    /// String that must be valid base64 encoded UTF-8.
    Base64EncodedString,
    /// Filesystem path.
    Path,
    /// One of a fixed set of upper case string literals.
    Choice(Vec<String>),
    /// Homogeneous, comma separated list.
    List(Box<ValueType>),
    /// Nullable variant of another type.
    Optional(Box<ValueType>),
}

impl ValueType {
    /// Closed string set built from the given literals.
    pub fn choice<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choice(options.into_iter().map(Into::into).collect())
    }

    /// List of `element`.
    pub fn list(element: ValueType) -> Self {
        Self::List(Box::new(element))
    }

    /// Nullable `inner`.
    pub fn optional(inner: ValueType) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Whether the type is one of the supported shapes.
    pub fn is_supported(&self) -> bool {
        match self {
            Self::Str
            | Self::Int
            | Self::Float
            | Self::Bool
            | Self::UnvalidatedDict
            | Self::Base64EncodedString
            | Self::Path => true,
            Self::Choice(options) => choice_set_is_valid(options),
            Self::List(element) => element.is_list_element() && element.is_supported(),
            Self::Optional(inner) => !inner.is_optional() && inner.is_supported(),
        }
    }

    /// Whether `null` is an acceptable value.
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// The type with any optional wrapper removed.
    pub fn inner(&self) -> &ValueType {
        match self {
            Self::Optional(inner) => inner,
            other => other,
        }
    }

    /// Whether this is a list (optional or not).
    pub fn is_list(&self) -> bool {
        matches!(self.inner(), Self::List(_))
    }

    /// The literals of a choice or list-of-choice type.
    pub fn choices(&self) -> Option<&[String]> {
        match self.inner() {
            Self::Choice(options) => Some(options),
            Self::List(element) => match element.as_ref() {
                Self::Choice(options) => Some(options),
                _ => None,
            },
            _ => None,
        }
    }

    // Lists split on commas, so JSON objects and nested shapes cannot be elements.
    fn is_list_element(&self) -> bool {
        !matches!(
            self,
            Self::UnvalidatedDict | Self::List(_) | Self::Optional(_)
        )
    }
}

/// Standalone form of [`ValueType::is_supported`].
pub fn type_is_supported(value_type: &ValueType) -> bool {
    value_type.is_supported()
}

fn choice_set_is_valid(options: &[String]) -> bool {
    if options.is_empty() {
        return false;
    }
    let mut seen = std::collections::HashSet::new();
    options
        .iter()
        .all(|o| !o.is_empty() && o.to_uppercase() == *o && seen.insert(o.as_str()))
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("str"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::UnvalidatedDict => f.write_str("dict"),
            Self::Base64EncodedString => f.write_str("base64"),
            Self::Path => f.write_str("path"),
            Self::Choice(options) => write!(f, "choice[{}]", options.join(", ")),
            Self::List(element) => write!(f, "list[{element}]"),
            Self::Optional(inner) => write!(f, "optional[{inner}]"),
        }
    }
}
