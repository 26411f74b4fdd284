//! Configuration primitives shared by the kitbag dispatcher and CLI.
//!
//! The crate owns three concerns:
//!
//! - the dynamic value model used for global and plugin-local configuration
//!   ([`ConfigValue`], [`ConfigMap`] and the exhaustive [`ValueKind`] view),
//! - the merge engine that combines two configuration trees under a
//!   [`MergeStrategy`],
//! - the file-backed [`ConfigStore`], which reads YAML or JSON depending on
//!   the file extension and persists atomically.
//!
//! ```rust
//! use kitbag_config::{ConfigMap, MergeStrategy, merge};
//! use serde_json::json;
//!
//! let base: ConfigMap = serde_json::from_value(json!({"tools": ["a"]})).unwrap_or_default();
//! let overlay: ConfigMap = serde_json::from_value(json!({"tools": ["b"]})).unwrap_or_default();
//!
//! let merged = merge(base, &overlay, MergeStrategy::Append);
//! assert_eq!(merged.get("tools"), Some(&json!(["a", "b"])));
//! ```

mod defaults;
mod error;
mod logging;
mod merge;
mod store;
mod value;

pub use defaults::{DEFAULT_LOG_FILTER, default_log_format};
pub use error::ConfigStoreError;
pub use logging::{LogFormat, LogFormatParseError};
pub use merge::{MergeStrategy, merge, merge_values};
pub use store::{ConfigFormat, ConfigStore, atomic_write};
pub use value::{ConfigMap, ConfigValue, ValueKind, into_mapping, kind_of};
