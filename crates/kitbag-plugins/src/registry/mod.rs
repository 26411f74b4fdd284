//! Registry of installed plugins.
//!
//! The registry is a YAML document at `.kitbag/registry/installed.yaml`
//! holding a single `plugins` list. Records are keyed by install name (the
//! directory under `plugins/`). A logical name may only be claimed by one
//! install, so lookups by logical name stay unambiguous for registries
//! written through [`RegistryStore::register`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kitbag_config::atomic_write;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::RegistryError;
use crate::layout::EnvLayout;
use crate::manifest::PluginManifest;

const REGISTRY_TARGET: &str = "kitbag_plugins::registry";

/// Registry record for one installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    name: String,
    #[serde(alias = "installName")]
    install_name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    source: String,
    #[serde(default, rename = "ref")]
    reference: String,
    #[serde(default)]
    shims: Vec<String>,
    #[serde(with = "time::serde::rfc3339", alias = "installedAt")]
    installed_at: OffsetDateTime,
}

impl InstalledPlugin {
    /// Creates a record stamped with the current UTC time.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        install_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            install_name: install_name.into(),
            version: version.into(),
            source: String::new(),
            reference: String::new(),
            shims: Vec::new(),
            installed_at: OffsetDateTime::now_utc(),
        }
    }

    /// Builds a record from a loaded manifest; the manifest's `expose`
    /// aliases become the record's shims.
    #[must_use]
    pub fn from_manifest(
        manifest: &PluginManifest,
        install_name: impl Into<String>,
        source: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self::new(manifest.name(), install_name, manifest.version())
            .with_source(source)
            .with_reference(reference)
            .with_shims(manifest.expose().to_vec())
    }

    /// Sets the provenance descriptor.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the source reference (branch, tag or commit).
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    /// Sets the exposed shim names.
    #[must_use]
    pub fn with_shims(mut self, shims: Vec<String>) -> Self {
        self.shims = shims;
        self
    }

    /// Overrides the installation timestamp.
    #[must_use]
    pub const fn with_installed_at(mut self, installed_at: OffsetDateTime) -> Self {
        self.installed_at = installed_at;
        self
    }

    /// Returns the logical name from the manifest.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the directory name under `plugins/`.
    #[must_use]
    pub const fn install_name(&self) -> &str {
        self.install_name.as_str()
    }

    /// Returns the installed version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the provenance descriptor.
    #[must_use]
    pub const fn source(&self) -> &str {
        self.source.as_str()
    }

    /// Returns the source reference.
    #[must_use]
    pub const fn reference(&self) -> &str {
        self.reference.as_str()
    }

    /// Returns the exposed shim names.
    #[must_use]
    pub fn shims(&self) -> &[String] {
        &self.shims
    }

    /// Returns when the plugin was installed.
    #[must_use]
    pub const fn installed_at(&self) -> OffsetDateTime {
        self.installed_at
    }
}

/// In-memory registry contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    plugins: Vec<InstalledPlugin>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record in insertion order.
    #[must_use]
    pub fn plugins(&self) -> &[InstalledPlugin] {
        &self.plugins
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true when nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Looks up a record by install name.
    #[must_use]
    pub fn get(&self, install_name: &str) -> Option<&InstalledPlugin> {
        self.plugins
            .iter()
            .find(|record| record.install_name == install_name)
    }

    /// Returns every record declaring the logical `name`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Vec<&InstalledPlugin> {
        self.plugins
            .iter()
            .filter(|record| record.name == name)
            .collect()
    }

    /// Inserts or replaces the record with the same install name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] when a record with a
    /// different install name already declares the same logical name.
    pub fn upsert(&mut self, record: InstalledPlugin) -> Result<(), RegistryError> {
        if let Some(clash) = self
            .plugins
            .iter()
            .find(|existing| existing.name == record.name && existing.install_name != record.install_name)
        {
            return Err(RegistryError::DuplicateName {
                name: record.name,
                existing: clash.install_name.clone(),
            });
        }
        match self
            .plugins
            .iter_mut()
            .find(|existing| existing.install_name == record.install_name)
        {
            Some(slot) => *slot = record,
            None => self.plugins.push(record),
        }
        Ok(())
    }

    /// Removes the record with the given install name.
    pub fn remove(&mut self, install_name: &str) -> Option<InstalledPlugin> {
        let index = self
            .plugins
            .iter()
            .position(|record| record.install_name == install_name)?;
        Some(self.plugins.remove(index))
    }
}

/// File-backed registry for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    /// Creates a store for the environment rooted at `env_root`.
    #[must_use]
    pub fn new(env_root: impl AsRef<Path>) -> Self {
        Self::for_layout(&EnvLayout::new(env_root))
    }

    /// Creates a store at the registry path of `layout`.
    #[must_use]
    pub fn for_layout(layout: &EnvLayout) -> Self {
        Self {
            path: layout.registry_path(),
        }
    }

    /// Returns the registry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the registry; a missing file is an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Read`] or [`RegistryError::Parse`].
    pub fn load(&self) -> Result<Registry, RegistryError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Registry::new());
            }
            Err(error) => {
                return Err(RegistryError::Read {
                    path: self.path.clone(),
                    source: Arc::new(error),
                });
            }
        };
        if contents.trim().is_empty() {
            return Ok(Registry::new());
        }
        serde_yaml::from_str(&contents).map_err(|error| RegistryError::Parse {
            path: self.path.clone(),
            message: error.to_string(),
        })
    }

    /// Writes the registry atomically, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Write`] when rendering or persisting fails.
    pub fn save(&self, registry: &Registry) -> Result<(), RegistryError> {
        let rendered = serde_yaml::to_string(registry)
            .map_err(|error| self.write_error(io::Error::other(error.to_string())))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| self.write_error(error))?;
        }
        atomic_write(&self.path, rendered.as_bytes()).map_err(|error| self.write_error(error))?;
        debug!(
            target: REGISTRY_TARGET,
            path = %self.path.display(),
            records = registry.len(),
            "registry saved"
        );
        Ok(())
    }

    /// Returns the record installed as `install_name`.
    ///
    /// # Errors
    ///
    /// Propagates load failures.
    pub fn get_by_install_name(
        &self,
        install_name: &str,
    ) -> Result<Option<InstalledPlugin>, RegistryError> {
        Ok(self.load()?.get(install_name).cloned())
    }

    /// Returns every record declaring the logical `name`.
    ///
    /// # Errors
    ///
    /// Propagates load failures.
    pub fn find_by_name(&self, name: &str) -> Result<Vec<InstalledPlugin>, RegistryError> {
        Ok(self
            .load()?
            .find_by_name(name)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Inserts or replaces a record and saves the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] when another install already
    /// claims the logical name, or any load/save failure.
    pub fn register(&self, record: InstalledPlugin) -> Result<(), RegistryError> {
        let mut registry = self.load()?;
        registry.upsert(record)?;
        self.save(&registry)
    }

    /// Removes a record and saves the registry. Returns false when no record
    /// matched, in which case the file is left untouched.
    ///
    /// # Errors
    ///
    /// Propagates load/save failures.
    pub fn unregister(&self, install_name: &str) -> Result<bool, RegistryError> {
        let mut registry = self.load()?;
        if registry.remove(install_name).is_none() {
            return Ok(false);
        }
        self.save(&registry)?;
        Ok(true)
    }

    fn write_error(&self, error: io::Error) -> RegistryError {
        RegistryError::Write {
            path: self.path.clone(),
            source: Arc::new(error),
        }
    }
}

#[cfg(test)]
mod tests;
