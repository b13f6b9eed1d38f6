//! Domain models for tree nodes, selection state, and ignore rules.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Extensions ignored when nothing else has been configured.
pub const DEFAULT_IGNORED_EXTENSIONS: &[&str] = &[".scml", ".pyc", ".pyo", ".pyd"];

/// Directory names that are never listed or descended into by default.
pub const DEFAULT_IGNORED_DIRECTORIES: &[&str] = &["__pycache__", ".git", ".vscode"];

/// Handle to a node owned by a [`crate::app::tree::SelectionTree`].
///
/// Handles are only meaningful for the tree instance that issued them and are invalidated when the
/// root is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }
}

/// Tri-state selection of a node. `Mixed` is only ever derived for directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionState {
    #[default]
    Unselected,
    Selected,
    Mixed,
}

impl SelectionState {
    /// The state a direct toggle moves to. Mixed directories become fully selected.
    pub fn toggled(self) -> Self {
        match self {
            SelectionState::Selected => SelectionState::Unselected,
            SelectionState::Unselected | SelectionState::Mixed => SelectionState::Selected,
        }
    }

    /// Aggregate child states into the parent state. Returns `None` for an empty iterator.
    pub fn aggregate<I>(states: I) -> Option<Self>
    where
        I: IntoIterator<Item = SelectionState>,
    {
        let mut any_selected = false;
        let mut any_unselected = false;
        let mut seen = false;
        for state in states {
            seen = true;
            match state {
                SelectionState::Selected => any_selected = true,
                SelectionState::Unselected => any_unselected = true,
                SelectionState::Mixed => return Some(SelectionState::Mixed),
            }
            if any_selected && any_unselected {
                return Some(SelectionState::Mixed);
            }
        }
        if !seen {
            None
        } else if any_selected {
            Some(SelectionState::Selected)
        } else {
            Some(SelectionState::Unselected)
        }
    }

    /// Checkbox glyph used by the text renderers.
    pub fn marker(&self) -> &'static str {
        match self {
            SelectionState::Selected => "[x]",
            SelectionState::Unselected => "[ ]",
            SelectionState::Mixed => "[~]",
        }
    }
}

/// Filters applied while scanning: extensions (with leading dot, lowercase) and exact directory
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IgnoreRules {
    ignored_extensions: BTreeSet<String>,
    ignored_directory_names: BTreeSet<String>,
}

impl IgnoreRules {
    pub fn new<E, D>(extensions: E, directories: D) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let mut rules = Self::default();
        for ext in extensions {
            rules.add_extension(ext.as_ref());
        }
        for dir in directories {
            rules.add_directory(dir.as_ref());
        }
        rules
    }

    /// The hard-coded rules used when no preferences or configuration exist.
    pub fn standard() -> Self {
        Self::new(DEFAULT_IGNORED_EXTENSIONS, DEFAULT_IGNORED_DIRECTORIES)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.ignored_extensions.iter().map(String::as_str)
    }

    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.ignored_directory_names.iter().map(String::as_str)
    }

    /// Add an extension; a missing leading dot is added. Returns `true` when newly inserted.
    pub fn add_extension(&mut self, raw: &str) -> bool {
        match normalize_extension(raw) {
            Some(ext) => self.ignored_extensions.insert(ext),
            None => false,
        }
    }

    pub fn remove_extension(&mut self, raw: &str) -> bool {
        match normalize_extension(raw) {
            Some(ext) => self.ignored_extensions.remove(&ext),
            None => false,
        }
    }

    /// Replace the ignored extensions wholesale, keeping directory rules.
    pub fn replace_extensions<I>(&mut self, extensions: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.ignored_extensions.clear();
        for ext in extensions {
            self.add_extension(ext.as_ref());
        }
    }

    pub fn add_directory(&mut self, name: &str) -> bool {
        let trimmed = name.trim().trim_matches('/');
        if trimmed.is_empty() {
            return false;
        }
        self.ignored_directory_names.insert(trimmed.to_owned())
    }

    pub fn remove_directory(&mut self, name: &str) -> bool {
        self.ignored_directory_names
            .remove(name.trim().trim_matches('/'))
    }

    pub fn ignores_directory(&self, name: &str) -> bool {
        self.ignored_directory_names.contains(name)
    }

    /// Whether a file is filtered by its final dot-delimited suffix (case-insensitive).
    pub fn ignores_file(&self, path: &Path) -> bool {
        extension_key(path).is_some_and(|ext| self.ignored_extensions.contains(&ext))
    }

    /// Short human-readable summary of the active extension filter.
    pub fn status_line(&self) -> String {
        if self.ignored_extensions.is_empty() {
            "Showing all file types".to_owned()
        } else {
            let joined: Vec<&str> = self.extensions().collect();
            format!("Ignoring: {}", joined.join(", "))
        }
    }
}

/// Lowercased extension of `path` including the leading dot, if it has one.
pub fn extension_key(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('*');
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with('.') {
        Some(lower)
    } else {
        Some(format!(".{lower}"))
    }
}

/// Predefined extension lists that replace the ignored extensions in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum IgnorePreset {
    /// Source code files.
    Code,
    /// Text and office documents.
    Documents,
    /// Images, audio, and video.
    Media,
}

impl IgnorePreset {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            IgnorePreset::Code => &[".py", ".js", ".html", ".css", ".java", ".cpp", ".c", ".h"],
            IgnorePreset::Documents => &[".txt", ".md", ".doc", ".docx", ".pdf", ".rtf"],
            IgnorePreset::Media => &[".jpg", ".jpeg", ".png", ".gif", ".mp3", ".mp4", ".wav"],
        }
    }
}

impl fmt::Display for IgnorePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IgnorePreset::Code => "code",
            IgnorePreset::Documents => "documents",
            IgnorePreset::Media => "media",
        };
        f.write_str(label)
    }
}
