//! Dynamic configuration values.
//!
//! Configuration files and stdio protocol payloads are loosely typed trees.
//! They are represented with [`serde_json::Value`] built with
//! `preserve_order`, so mappings keep the key order they were read in.
//! [`ValueKind`] gives callers an exhaustive, payload-free view of a value so
//! type-mismatch handling can be matched on directly.

use serde_json::{Map, Value};

/// A single configuration value: null, bool, number, string, sequence or
/// mapping.
pub type ConfigValue = Value;

/// An ordered mapping from string keys to configuration values.
pub type ConfigMap = Map<String, Value>;

/// Shape of a [`ConfigValue`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `null` (also produced for an empty YAML document).
    Null,
    /// `true` or `false`.
    Bool,
    /// Integer or floating point number.
    Number,
    /// UTF-8 text.
    String,
    /// Ordered sequence of values.
    Sequence,
    /// Ordered mapping of string keys to values.
    Mapping,
}

impl ValueKind {
    /// Returns a lowercase name suitable for diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Sequence => "sequence",
            Self::Mapping => "mapping",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a value.
#[must_use]
pub const fn kind_of(value: &ConfigValue) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(_) => ValueKind::Number,
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Sequence,
        Value::Object(_) => ValueKind::Mapping,
    }
}

/// Converts a value into a mapping.
///
/// `null` becomes an empty mapping. Any other non-mapping value is returned
/// unchanged in the `Err` variant so callers can report its kind.
///
/// # Errors
///
/// Returns the original value when it is neither a mapping nor `null`.
pub fn into_mapping(value: ConfigValue) -> Result<ConfigMap, ConfigValue> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ConfigMap::new()),
        other => Err(other),
    }
}
