//! Configuration management utilities.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::app::merge::{DEFAULT_CHUNK_SIZE, DEFAULT_LINE_NUMBER_WIDTH, MIN_CHUNK_SIZE};
use crate::domain::model::{DEFAULT_IGNORED_DIRECTORIES, DEFAULT_IGNORED_EXTENSIONS};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".filemerge/config.toml";

const PREFERENCES_ENV: &str = "FILEMERGE_PREFERENCES";
const CHUNK_SIZE_ENV: &str = "FILEMERGE_CHUNK_SIZE";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub merge: Merge,
    #[serde(default)]
    pub storage: Storage,
}

/// Seed values for preferences that do not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    ignored_extensions: Vec<String>,
    #[serde(default)]
    ignored_directories: Vec<String>,
    #[serde(default)]
    include_structure: Option<bool>,
    #[serde(default)]
    include_line_numbers: Option<bool>,
    #[serde(default)]
    include_ignored_in_structure: Option<bool>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            ignored_extensions: DEFAULT_IGNORED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_owned())
                .collect(),
            ignored_directories: DEFAULT_IGNORED_DIRECTORIES
                .iter()
                .map(|dir| (*dir).to_owned())
                .collect(),
            include_structure: None,
            include_line_numbers: None,
            include_ignored_in_structure: None,
        }
    }
}

impl Defaults {
    pub fn ignored_extensions(&self) -> Vec<String> {
        self.ignored_extensions.clone()
    }

    pub fn ignored_directories(&self) -> Vec<String> {
        self.ignored_directories.clone()
    }

    pub fn include_structure(&self) -> bool {
        self.include_structure.unwrap_or(true)
    }

    pub fn include_line_numbers(&self) -> bool {
        self.include_line_numbers.unwrap_or(false)
    }

    pub fn include_ignored_in_structure(&self) -> bool {
        self.include_ignored_in_structure.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Merge {
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    line_number_width: Option<usize>,
    #[serde(default)]
    output_file_name: Option<String>,
}

impl Merge {
    fn default_output_file_name() -> &'static str {
        "merged_files.txt"
    }

    /// Bytes read per streamed chunk, never below the engine minimum.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
            .unwrap_or(DEFAULT_CHUNK_SIZE)
            .max(MIN_CHUNK_SIZE)
    }

    pub fn line_number_width(&self) -> usize {
        self.line_number_width
            .unwrap_or(DEFAULT_LINE_NUMBER_WIDTH)
            .max(1)
    }

    pub fn output_file_name(&self) -> String {
        self.output_file_name
            .clone()
            .unwrap_or_else(|| Self::default_output_file_name().to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Storage {
    #[serde(default)]
    preferences_path: Option<PathBuf>,
}

impl Storage {
    pub fn preferences_path(&self) -> Option<&Path> {
        self.preferences_path.as_deref()
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    preferences_path: Option<PathBuf>,
    chunk_size: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            preferences_path: env::var_os(PREFERENCES_ENV).map(PathBuf::from),
            chunk_size: env::var(CHUNK_SIZE_ENV).ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(preferences_path: &str, chunk_size: &str) -> Self {
        Self {
            preferences_path: Some(PathBuf::from(preferences_path)),
            chunk_size: Some(chunk_size.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG).context("invalid built-in configuration")?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            defaults: merge_defaults(self.defaults, other.defaults),
            merge: merge_merge(self.merge, other.merge),
            storage: merge_storage(self.storage, other.storage),
        }
    }
}

fn union(base: Vec<String>, overlay: Vec<String>) -> Vec<String> {
    let mut values: BTreeSet<String> = base.into_iter().collect();
    values.extend(overlay);
    values.into_iter().collect()
}

fn merge_defaults(base: Defaults, overlay: Defaults) -> Defaults {
    Defaults {
        ignored_extensions: union(base.ignored_extensions, overlay.ignored_extensions),
        ignored_directories: union(base.ignored_directories, overlay.ignored_directories),
        include_structure: overlay.include_structure.or(base.include_structure),
        include_line_numbers: overlay.include_line_numbers.or(base.include_line_numbers),
        include_ignored_in_structure: overlay
            .include_ignored_in_structure
            .or(base.include_ignored_in_structure),
    }
}

fn merge_merge(mut base: Merge, overlay: Merge) -> Merge {
    if let Some(value) = overlay.chunk_size {
        base.chunk_size = Some(value);
    }
    if let Some(value) = overlay.line_number_width {
        base.line_number_width = Some(value);
    }
    if let Some(value) = overlay.output_file_name {
        base.output_file_name = Some(value);
    }
    base
}

fn merge_storage(base: Storage, overlay: Storage) -> Storage {
    Storage {
        preferences_path: overlay.preferences_path.or(base.preferences_path),
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("filemerge/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(path) = env.preferences_path {
        config.storage.preferences_path = Some(path);
    }
    if let Some(raw) = env.chunk_size {
        match raw.trim().parse::<usize>() {
            Ok(size) => config.merge.chunk_size = Some(size),
            Err(err) => {
                tracing::warn!(value = %raw, error = %err, "ignoring invalid {CHUNK_SIZE_ENV}")
            }
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_uses_defaults_when_no_files() -> Result<()> {
        let config = Config::load_with_layers(None, None, EnvOverrides::default())?;
        assert!(config.defaults.ignored_extensions().contains(&".pyc".into()));
        assert!(config.defaults.ignored_directories().contains(&"__pycache__".into()));
        assert!(config.defaults.include_structure());
        assert!(!config.defaults.include_line_numbers());
        assert_eq!(config.merge.chunk_size(), 65_536);
        assert_eq!(config.merge.line_number_width(), 4);
        assert_eq!(config.merge.output_file_name(), "merged_files.txt");
        assert_eq!(config.storage.preferences_path(), None);
        Ok(())
    }

    #[test]
    fn default_config_carries_standard_ignores() {
        let config = Config::default();
        assert!(config.defaults.ignored_extensions().contains(&".pyd".into()));
        assert!(config.defaults.ignored_directories().contains(&".git".into()));
        assert!(config.defaults.include_structure());
    }

    #[test]
    fn merge_global_and_workspace() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let global = temp.path().join("config.toml");
        fs::write(
            &global,
            r#"
[defaults]
ignored_extensions = [".log"]
include_line_numbers = true
[merge]
line_number_width = 6
"#,
        )?;

        let workspace_dir = temp.path().join("repo");
        fs::create_dir_all(workspace_dir.join(".filemerge"))?;
        fs::create_dir_all(workspace_dir.join(".git"))?;
        fs::write(
            workspace_dir.join(".filemerge/config.toml"),
            r#"
[defaults]
ignored_directories = ["target"]
include_line_numbers = false
[merge]
output_file_name = "bundle.txt"
"#,
        )?;

        let global_path = Some(global);
        let workspace_path = Some(workspace_dir.join(".filemerge/config.toml"));

        let config =
            Config::load_with_layers(global_path, workspace_path, EnvOverrides::default())?;

        let extensions = config.defaults.ignored_extensions();
        assert!(extensions.contains(&".log".into()));
        assert!(extensions.contains(&".pyc".into()));
        assert!(config.defaults.ignored_directories().contains(&"target".into()));
        assert!(!config.defaults.include_line_numbers());
        assert_eq!(config.merge.line_number_width(), 6);
        assert_eq!(config.merge.output_file_name(), "bundle.txt");

        Ok(())
    }

    #[test]
    fn env_overrides_take_precedence() -> Result<()> {
        let overrides = EnvOverrides::for_tests("/tmp/prefs.json", "1024");
        let config = Config::load_with_layers(None, None, overrides)?;
        assert_eq!(
            config.storage.preferences_path(),
            Some(Path::new("/tmp/prefs.json"))
        );
        assert_eq!(config.merge.chunk_size(), 1024);
        Ok(())
    }

    #[test]
    fn chunk_size_is_clamped_and_bad_env_ignored() -> Result<()> {
        let config = Config::load_with_layers(None, None, EnvOverrides::for_tests("p", "64"))?;
        assert_eq!(config.merge.chunk_size(), MIN_CHUNK_SIZE);

        let config =
            Config::load_with_layers(None, None, EnvOverrides::for_tests("p", "lots"))?;
        assert_eq!(config.merge.chunk_size(), DEFAULT_CHUNK_SIZE);
        Ok(())
    }

    #[test]
    fn invalid_config_returns_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("broken.toml");
        fs::write(&file, "this is not toml")?;
        let err = Config::from_file(&file).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
        Ok(())
    }
}
