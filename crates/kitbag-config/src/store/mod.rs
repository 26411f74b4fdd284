//! File-backed configuration mappings.
//!
//! A [`ConfigStore`] reads and writes one configuration file. The format is
//! chosen from the extension: `.json` files are JSON, everything else is
//! YAML. A missing or empty file reads as an empty mapping. Writes go through
//! [`atomic_write`] so a crash never leaves a truncated document behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::Builder;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::ConfigStoreError;
use crate::value::{ConfigMap, ConfigValue, into_mapping, kind_of};

/// Serialisation format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML document (the default).
    Yaml,
    /// JSON document.
    Json,
}

impl ConfigFormat {
    /// Selects a format from the file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Reads and atomically writes a single configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
    format: ConfigFormat,
}

impl ConfigStore {
    /// Creates a store for `path`, inferring the format from its extension.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ConfigFormat::from_path(&path);
        Self { path, format }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file format.
    #[must_use]
    pub const fn format(&self) -> ConfigFormat {
        self.format
    }

    /// Loads the mapping stored in the file.
    ///
    /// A missing file, an empty file and a `null` document all yield an empty
    /// mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Read`] when the file exists but cannot be
    /// read and [`ConfigStoreError::Parse`] when it is not a mapping.
    pub fn load(&self) -> Result<ConfigMap, ConfigStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(ConfigMap::new());
            }
            Err(error) => {
                return Err(ConfigStoreError::Read {
                    path: self.path.clone(),
                    source: Arc::new(error),
                });
            }
        };
        self.parse(&contents)
    }

    /// Parses document text in the store's format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Parse`] when the text is malformed or its
    /// top level is not a mapping.
    pub fn parse(&self, contents: &str) -> Result<ConfigMap, ConfigStoreError> {
        if contents.trim().is_empty() {
            return Ok(ConfigMap::new());
        }
        let parsed: Result<ConfigValue, String> = match self.format {
            ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        };
        let value = parsed.map_err(|message| self.parse_error(message))?;
        into_mapping(value).map_err(|other| {
            self.parse_error(format!("expected a mapping at top level, found {}", kind_of(&other)))
        })
    }

    /// Renders `map` in the store's format and writes it atomically,
    /// creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Serialise`] when rendering fails and
    /// [`ConfigStoreError::Write`] when the file cannot be persisted.
    pub fn save(&self, map: &ConfigMap) -> Result<(), ConfigStoreError> {
        let rendered = self.render(map)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| self.write_error(error))?;
        }
        atomic_write(&self.path, rendered.as_bytes()).map_err(|error| self.write_error(error))
    }

    fn render(&self, map: &ConfigMap) -> Result<String, ConfigStoreError> {
        let rendered = match self.format {
            ConfigFormat::Yaml => serde_yaml::to_string(map).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::to_string_pretty(map)
                .map(|mut text| {
                    text.push('\n');
                    text
                })
                .map_err(|e| e.to_string()),
        };
        rendered.map_err(|message| ConfigStoreError::Serialise {
            path: self.path.clone(),
            message,
        })
    }

    fn parse_error(&self, message: String) -> ConfigStoreError {
        ConfigStoreError::Parse {
            path: self.path.clone(),
            message,
        }
    }

    fn write_error(&self, error: io::Error) -> ConfigStoreError {
        ConfigStoreError::Write {
            path: self.path.clone(),
            source: Arc::new(error),
        }
    }
}

/// Replaces the file at `path` with `contents` in one step.
///
/// The bytes go to a named temporary file beside the target, are synced to
/// disk, and the temporary file is then persisted over `path`. If any step
/// fails the previous file is left as it was.
///
/// # Errors
///
/// Returns any I/O error raised while creating, writing or renaming the
/// temporary file. A path without a parent directory is reported as
/// [`io::ErrorKind::NotFound`].
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "config path has no parent directory",
            ));
        }
    };

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("kitbag"),
    );
    #[cfg(unix)]
    {
        builder.permissions(fs::Permissions::from_mode(0o644));
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
