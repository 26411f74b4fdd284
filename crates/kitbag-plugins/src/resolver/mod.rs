//! Three-tier lookup from a user-supplied identifier to a plugin directory.
//!
//! 1. The identifier is an install name: `plugins/<identifier>` exists.
//! 2. The registry holds a record with that install name whose directory
//!    exists.
//! 3. Exactly one registry record declares the identifier as its logical
//!    name and its directory exists.
//!
//! Identifiers and install names that are empty, `.`/`..`, or contain a path
//! separator never address a directory, so lookups cannot leave `plugins/`.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ResolveError;
use crate::layout::EnvLayout;
use crate::registry::RegistryStore;

const RESOLVER_TARGET: &str = "kitbag_plugins::resolver";

/// A plugin directory together with the install name it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlugin {
    dir: PathBuf,
    install_name: String,
}

impl ResolvedPlugin {
    /// Returns the plugin directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the install name.
    #[must_use]
    pub const fn install_name(&self) -> &str {
        self.install_name.as_str()
    }
}

/// Resolves `identifier` to an installed plugin directory.
///
/// The registry is only read when the identifier is not itself an existing
/// install directory, so a corrupt registry does not block direct access.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] when no tier matches,
/// [`ResolveError::Ambiguous`] when several installs share the logical name,
/// and [`ResolveError::Registry`] when the registry cannot be loaded.
pub fn resolve_plugin(
    layout: &EnvLayout,
    registry: &RegistryStore,
    identifier: &str,
) -> Result<ResolvedPlugin, ResolveError> {
    if let Some(found) = existing_install(layout, identifier) {
        debug!(target: RESOLVER_TARGET, identifier, tier = 1, "resolved by install directory");
        return Ok(found);
    }

    let records = registry.load().map_err(|source| ResolveError::Registry {
        identifier: identifier.to_owned(),
        source,
    })?;

    if let Some(found) = records
        .get(identifier)
        .and_then(|record| existing_install(layout, record.install_name()))
    {
        debug!(target: RESOLVER_TARGET, identifier, tier = 2, "resolved by registry install name");
        return Ok(found);
    }

    let mut matches: Vec<ResolvedPlugin> = records
        .find_by_name(identifier)
        .into_iter()
        .filter_map(|record| existing_install(layout, record.install_name()))
        .collect();
    match matches.len() {
        0 => Err(ResolveError::NotFound {
            identifier: identifier.to_owned(),
        }),
        1 => {
            debug!(target: RESOLVER_TARGET, identifier, tier = 3, "resolved by logical name");
            Ok(matches.remove(0))
        }
        _ => Err(ResolveError::Ambiguous {
            identifier: identifier.to_owned(),
            candidates: matches.into_iter().map(|m| m.install_name).collect(),
        }),
    }
}

fn existing_install(layout: &EnvLayout, install_name: &str) -> Option<ResolvedPlugin> {
    if !is_install_name(install_name) {
        return None;
    }
    let dir = layout.plugin_dir(install_name);
    dir.is_dir().then(|| ResolvedPlugin {
        dir,
        install_name: install_name.to_owned(),
    })
}

/// Returns true when `name` can only denote a direct child of `plugins/`.
#[must_use]
pub fn is_install_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

#[cfg(test)]
mod tests;
