//! Strategy-driven deep merge of configuration trees.
//!
//! Keys that only exist in the overlay are always adopted. Keys present on
//! both sides are resolved per [`MergeStrategy`]:
//!
//! | base / overlay      | `override`   | `append`      | `keep`  |
//! |---------------------|--------------|---------------|---------|
//! | mapping / mapping   | recurse      | recurse       | recurse |
//! | sequence / sequence | overlay      | concatenate   | base    |
//! | anything else       | overlay      | overlay       | base    |
//!
//! Merging never fails: mismatched shapes degrade to the scalar rule.

use std::convert::Infallible;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{ConfigMap, ConfigValue};

/// Conflict-resolution policy applied when two configuration trees meet.
///
/// Parsing is lenient: anything other than `append` or `keep` (ignoring case
/// and surrounding whitespace) selects [`MergeStrategy::Override`].
///
/// ```
/// use kitbag_config::MergeStrategy;
///
/// assert_eq!("APPEND".parse(), Ok(MergeStrategy::Append));
/// assert_eq!("bogus".parse(), Ok(MergeStrategy::Override));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Overlay replaces base on conflicts; mappings merge recursively.
    #[default]
    Override,
    /// Mappings merge recursively, sequences concatenate, scalars are replaced.
    Append,
    /// Base wins; the overlay only fills keys missing from the base.
    Keep,
}

impl MergeStrategy {
    /// Parses a strategy name, falling back to [`MergeStrategy::Override`].
    #[must_use]
    pub fn parse_lenient(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "append" => Self::Append,
            "keep" => Self::Keep,
            _ => Self::Override,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Append => "append",
            Self::Keep => "keep",
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lenient(input))
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merges `overlay` into `base` and returns the result.
///
/// `base` is consumed; callers that need the original must clone it first.
/// The overlay is only read.
#[must_use]
pub fn merge(base: ConfigMap, overlay: &ConfigMap, strategy: MergeStrategy) -> ConfigMap {
    let mut merged = base;
    for (key, incoming) in overlay {
        match merged.get_mut(key) {
            Some(existing) => merge_entry(existing, incoming, strategy),
            None => {
                merged.insert(key.clone(), incoming.clone());
            }
        }
    }
    merged
}

/// Merges two arbitrary values.
///
/// Two mappings merge key by key as in [`merge`]; every other combination
/// follows the conflict rule for an existing key.
#[must_use]
pub fn merge_values(base: ConfigValue, overlay: &ConfigValue, strategy: MergeStrategy) -> ConfigValue {
    let mut merged = base;
    merge_entry(&mut merged, overlay, strategy);
    merged
}

fn merge_entry(existing: &mut ConfigValue, incoming: &ConfigValue, strategy: MergeStrategy) {
    match (existing, incoming) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let taken = std::mem::take(base_map);
            *base_map = merge(taken, overlay_map, strategy);
        }
        (Value::Array(base_items), Value::Array(overlay_items)) => match strategy {
            MergeStrategy::Append => base_items.extend(overlay_items.iter().cloned()),
            MergeStrategy::Override => base_items.clone_from(overlay_items),
            MergeStrategy::Keep => {}
        },
        (slot, value) => {
            if strategy != MergeStrategy::Keep {
                slot.clone_from(value);
            }
        }
    }
}
