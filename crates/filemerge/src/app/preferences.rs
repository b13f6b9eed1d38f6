//! Preference persistence between runs.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::domain::model::{DEFAULT_IGNORED_DIRECTORIES, DEFAULT_IGNORED_EXTENSIONS, IgnoreRules};
use crate::infra::config::Config;

pub const PREFERENCES_VERSION: u32 = 2;

const APP_DIR: &str = "filemerge";
const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("failed to read preferences at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid preferences in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize preferences: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write preferences to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Everything remembered between runs. Unknown fields are ignored and missing ones defaulted so
/// older and newer files both load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Preferences {
    pub version: u32,
    pub ignored_filetypes: Vec<String>,
    pub ignored_directories: Vec<String>,
    pub root_dir: Option<PathBuf>,
    pub default_output_dir: Option<PathBuf>,
    pub include_structure: bool,
    pub include_line_numbers: bool,
    pub include_ignored_in_structure: bool,
    /// Only `true` entries are meaningful.
    pub selected_paths: BTreeMap<PathBuf, bool>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            ignored_filetypes: DEFAULT_IGNORED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_owned())
                .collect(),
            ignored_directories: DEFAULT_IGNORED_DIRECTORIES
                .iter()
                .map(|dir| (*dir).to_owned())
                .collect(),
            root_dir: None,
            default_output_dir: None,
            include_structure: true,
            include_line_numbers: false,
            include_ignored_in_structure: false,
            selected_paths: BTreeMap::new(),
        }
    }
}

impl Preferences {
    /// Fresh preferences seeded from the `[defaults]` configuration section.
    pub fn from_config(config: &Config) -> Self {
        let defaults = &config.defaults;
        Self {
            ignored_filetypes: defaults.ignored_extensions(),
            ignored_directories: defaults.ignored_directories(),
            include_structure: defaults.include_structure(),
            include_line_numbers: defaults.include_line_numbers(),
            include_ignored_in_structure: defaults.include_ignored_in_structure(),
            ..Self::default()
        }
    }

    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules::new(&self.ignored_filetypes, &self.ignored_directories)
    }

    pub fn set_ignore_rules(&mut self, rules: &IgnoreRules) {
        self.ignored_filetypes = rules.extensions().map(str::to_owned).collect();
        self.ignored_directories = rules.directories().map(str::to_owned).collect();
    }

    /// Saved selection, `true` entries only.
    pub fn selection(&self) -> impl Iterator<Item = &Path> {
        self.selected_paths
            .iter()
            .filter(|(_, selected)| **selected)
            .map(|(path, _)| path.as_path())
    }

    /// Replace the saved selection. Paths that are not valid UTF-8 cannot be stored in JSON and
    /// are left out so the rest of the record still saves.
    pub fn set_selection<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.selected_paths = paths
            .into_iter()
            .filter(|path| {
                let storable = path.to_str().is_some();
                if !storable {
                    tracing::warn!(
                        path = %path.display(),
                        "not saving selection for a path that is not valid UTF-8"
                    );
                }
                storable
            })
            .map(|path| (path, true))
            .collect();
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn default_output_dir(&self) -> Option<&Path> {
        self.default_output_dir
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

/// Reads and writes [`Preferences`] as JSON.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/filemerge/preferences.json`, when the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join(APP_DIR).join(PREFERENCES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored preferences. A missing file is `Ok(None)`.
    pub fn try_load(&self) -> Result<Option<Preferences>, PreferenceError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PreferenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let preferences: Preferences =
            serde_json::from_str(&data).map_err(|source| PreferenceError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if preferences.version > PREFERENCES_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                version = preferences.version,
                supported = PREFERENCES_VERSION,
                "preferences written by a newer version, loading best-effort"
            );
        }
        Ok(Some(preferences))
    }

    /// Load the stored preferences, substituting `fallback` when the file is missing or unusable.
    pub fn load_or(&self, fallback: Preferences) -> Preferences {
        match self.try_load() {
            Ok(Some(preferences)) => preferences,
            Ok(None) => fallback,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unusable preferences file");
                fallback
            }
        }
    }

    pub fn load(&self) -> Preferences {
        self.load_or(Preferences::default())
    }

    /// Write atomically: a temporary file beside the target is renamed over it.
    pub fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError> {
        let write_error = |source: io::Error| PreferenceError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(write_error)?;

        let mut stored = preferences.clone();
        stored.version = PREFERENCES_VERSION;
        let data = serde_json::to_string_pretty(&stored).map_err(PreferenceError::Serialize)?;

        let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;
        temp.write_all(data.as_bytes()).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(&self.path)
            .map_err(|err| write_error(err.error))?;

        tracing::debug!(path = %self.path.display(), "saved preferences");
        Ok(())
    }
}
