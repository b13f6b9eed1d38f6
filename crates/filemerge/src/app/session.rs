//! Session facade tying the selection tree, preferences, and merge engine together.
//!
//! Presentation code talks to [`Session`] only. Every mutating call writes preferences back
//! immediately; a failed write is logged and remembered but never aborts the action.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};

use crate::app::merge::{
    MergeEngine, MergeError, MergeJob, MergeOptions, MergeReport, format_system_time,
};
use crate::app::preferences::{PreferenceStore, Preferences};
use crate::app::report::{ReportError, StructureReport, group_thousands};
use crate::app::tree::SelectionTree;
use crate::domain::errors::DomainError;
use crate::domain::model::{IgnorePreset, IgnoreRules, NodeId, SelectionState};
use crate::infra::config::Config;

/// Size and timestamp of one entry, as shown by the details view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<String>,
}

impl fmt::Display for FileDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Path: {}", self.path.display())?;
        let kind = if self.is_dir { "directory" } else { "file" };
        writeln!(f, "Type: {kind}")?;
        writeln!(f, "Size: {} bytes", group_thousands(self.size))?;
        write!(
            f,
            "Modified: {}",
            self.modified.as_deref().unwrap_or("unknown")
        )
    }
}

pub struct Session {
    config: Config,
    store: PreferenceStore,
    preferences: Preferences,
    tree: SelectionTree,
    engine: MergeEngine,
    persist_error: Option<String>,
}

impl Session {
    /// Load preferences from `store`, seeding missing ones from configuration.
    pub fn new(config: Config, store: PreferenceStore) -> Self {
        let preferences = store.load_or(Preferences::from_config(&config));
        let tree = SelectionTree::new(preferences.ignore_rules());
        Self {
            config,
            store,
            preferences,
            tree,
            engine: MergeEngine::new(),
            persist_error: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn preference_path(&self) -> &Path {
        self.store.path()
    }

    pub fn tree(&self) -> &SelectionTree {
        &self.tree
    }

    pub fn rules(&self) -> &IgnoreRules {
        self.tree.rules()
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.tree.root_path()
    }

    /// Message of the most recent failed preference write, if the last write failed.
    pub fn persist_error(&self) -> Option<&str> {
        self.persist_error.as_deref()
    }

    /// Build the tree for `root`, expand its first level, and restore the saved selection.
    ///
    /// The root is canonicalized so saved selections match however the directory was spelled.
    pub fn open(&mut self, root: impl AsRef<Path>) -> Result<NodeId> {
        let root = fs::canonicalize(root.as_ref())
            .with_context(|| format!("failed to resolve root {}", root.as_ref().display()))?;

        self.tree.set_rules(self.preferences.ignore_rules());
        let id = self
            .tree
            .build_root(&root)
            .with_context(|| format!("failed to open root {}", root.display()))?;
        self.tree.expand(id)?;

        let saved: Vec<PathBuf> = self.preferences.selection().map(Path::to_path_buf).collect();
        let restored = self.tree.restore_selection(saved);
        tracing::info!(root = %root.display(), restored, "opened root");

        self.preferences.root_dir = Some(root);
        self.persist();
        Ok(id)
    }

    /// Reopen the root remembered in preferences, if any.
    pub fn open_saved_root(&mut self) -> Result<Option<NodeId>> {
        match self.preferences.root_dir().map(Path::to_path_buf) {
            Some(root) if root.is_dir() => self.open(root).map(Some),
            _ => Ok(None),
        }
    }

    /// Expand the branches holding saved selections so they become materialized. Returns the
    /// number of pending paths that were revealed.
    pub fn reveal_saved_selection(&mut self) -> usize {
        let pending: Vec<PathBuf> = self.tree.pending_selection().map(Path::to_path_buf).collect();
        let mut revealed = 0;
        for path in pending {
            if self.tree.find(&path).is_some() {
                continue;
            }
            match self.tree.reveal(&path) {
                Ok(_) => revealed += 1,
                Err(err) => tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "saved selection not revealed"
                ),
            }
        }
        revealed
    }

    /// Turn a user supplied path into an absolute one, relative paths resolving against the root.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let root = self.root_path().ok_or(DomainError::NoRoot)?;
        Ok(root.join(path))
    }

    pub fn expand_all(&mut self) -> Result<usize> {
        Ok(self.tree.expand_all()?)
    }

    pub fn expand(&mut self, id: NodeId) -> Result<usize> {
        Ok(self.tree.expand(id)?)
    }

    /// Expand the directory at `path`, revealing its ancestors first.
    pub fn expand_path(&mut self, path: &Path) -> Result<NodeId> {
        let path = self.resolve(path)?;
        let id = self.tree.reveal(&path)?;
        self.tree.expand(id)?;
        Ok(id)
    }

    pub fn toggle(&mut self, id: NodeId) -> Result<SelectionState> {
        let state = self.tree.toggle(id)?;
        self.persist();
        Ok(state)
    }

    pub fn toggle_path(&mut self, path: &Path) -> Result<SelectionState> {
        let path = self.resolve(path)?;
        let id = self
            .tree
            .reveal(&path)
            .with_context(|| format!("cannot select {}", path.display()))?;
        self.toggle(id)
    }

    pub fn selected_files(&self) -> Vec<PathBuf> {
        self.tree.selected_leaf_files()
    }

    /// Swap the ignore rules and rebuild the tree, carrying the current selection across.
    pub fn update_ignore_rules(&mut self, rules: IgnoreRules) -> Result<()> {
        self.preferences.set_ignore_rules(&rules);
        let root = self.root_path().map(Path::to_path_buf);
        let saved = self.tree.selected_paths();
        self.tree.set_rules(rules);

        if let Some(root) = root {
            let id = self.tree.build_root(&root)?;
            self.tree.expand(id)?;
            self.tree.restore_selection(saved);
            self.reveal_saved_selection();
        }
        self.persist();
        Ok(())
    }

    /// Ignore one more extension. Returns `false` when it was already ignored.
    pub fn ignore_extension(&mut self, extension: &str) -> Result<bool> {
        let mut rules = self.rules().clone();
        if !rules.add_extension(extension) {
            return Ok(false);
        }
        self.update_ignore_rules(rules)?;
        Ok(true)
    }

    pub fn unignore_extension(&mut self, extension: &str) -> Result<bool> {
        let mut rules = self.rules().clone();
        if !rules.remove_extension(extension) {
            return Ok(false);
        }
        self.update_ignore_rules(rules)?;
        Ok(true)
    }

    pub fn ignore_directory(&mut self, name: &str) -> Result<bool> {
        let mut rules = self.rules().clone();
        if !rules.add_directory(name) {
            return Ok(false);
        }
        self.update_ignore_rules(rules)?;
        Ok(true)
    }

    pub fn unignore_directory(&mut self, name: &str) -> Result<bool> {
        let mut rules = self.rules().clone();
        if !rules.remove_directory(name) {
            return Ok(false);
        }
        self.update_ignore_rules(rules)?;
        Ok(true)
    }

    /// Replace the ignored extensions with a preset list.
    pub fn apply_preset(&mut self, preset: IgnorePreset) -> Result<()> {
        let mut rules = self.rules().clone();
        rules.replace_extensions(preset.extensions());
        self.update_ignore_rules(rules)
    }

    pub fn status_line(&self) -> String {
        self.rules().status_line()
    }

    pub fn set_include_structure(&mut self, value: bool) {
        self.preferences.include_structure = value;
        self.persist();
    }

    pub fn set_include_line_numbers(&mut self, value: bool) {
        self.preferences.include_line_numbers = value;
        self.persist();
    }

    pub fn set_include_ignored_in_structure(&mut self, value: bool) {
        self.preferences.include_ignored_in_structure = value;
        self.persist();
    }

    pub fn structure_report(&self, show_ignored: bool) -> Result<String, ReportError> {
        StructureReport::generate(&self.selected_files(), self.rules(), show_ignored)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            include_structure: self.preferences.include_structure,
            include_line_numbers: self.preferences.include_line_numbers,
            show_ignored: self.preferences.include_ignored_in_structure,
            rules: self.rules().clone(),
            chunk_size: self.config.merge.chunk_size(),
            line_number_width: self.config.merge.line_number_width(),
        }
    }

    /// Where a merge writes when no explicit output is given.
    pub fn default_output_path(&self) -> PathBuf {
        let dir = self
            .preferences
            .default_output_dir()
            .or_else(|| self.root_path())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join(self.config.merge.output_file_name())
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.engine.cancel_handle()
    }

    /// Merge a snapshot of the current selection into `output`.
    pub fn merge_to_path<P>(
        &mut self,
        output: &Path,
        progress: P,
    ) -> Result<MergeReport, MergeError>
    where
        P: FnMut(usize, usize),
    {
        let job = MergeJob::new(self.selected_files(), self.merge_options());
        let report = self.engine.merge_to_path(&job, output, progress)?;

        if let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            self.preferences.default_output_dir = Some(dir.to_path_buf());
            self.persist();
        }
        Ok(report)
    }

    pub fn file_details(&self, path: &Path) -> Result<FileDetails> {
        let path = self.resolve(path)?;
        let metadata = fs::metadata(&path)
            .with_context(|| format!("failed to read metadata for {}", path.display()))?;
        Ok(FileDetails {
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(format_system_time),
            path,
        })
    }

    /// Write preferences through to disk. Failures are logged and remembered, not returned.
    pub fn persist(&mut self) -> bool {
        if self.tree.root().is_some() {
            self.preferences.set_selection(self.tree.selected_paths());
        }
        match self.store.save(&self.preferences) {
            Ok(()) => {
                self.persist_error = None;
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to save preferences");
                self.persist_error = Some(err.to_string());
                false
            }
        }
    }
}
