//! One-level directory scanning with ignore rules applied.

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::model::{IgnoreRules, NodeKind};

/// A single entry surfaced by [`Scanner::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: NodeKind,
}

/// Raised when a directory cannot be listed. [`Scanner::scan`] tolerates it.
#[derive(Debug, Error)]
#[error("failed to read directory {}: {source}", path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Lists directories one level at a time so the selection tree can expand lazily.
#[derive(Debug, Default, Clone, Copy)]
pub struct Scanner;

impl Scanner {
    pub fn new() -> Self {
        Self
    }

    /// List `dir`, treating an unreadable directory as empty.
    pub fn scan(&self, dir: &Path, rules: &IgnoreRules) -> Vec<ScanEntry> {
        match self.try_scan(dir, rules) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    path = %err.path.display(),
                    error = %err.source,
                    "directory unreadable, listing it as empty"
                );
                Vec::new()
            }
        }
    }

    /// List `dir`, sorted by case-insensitive name, without ignored entries.
    pub fn try_scan(&self, dir: &Path, rules: &IgnoreRules) -> Result<Vec<ScanEntry>, ScanError> {
        let read_dir = fs::read_dir(dir).map_err(|source| ScanError {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %err,
                        "skipping unreadable entry"
                    );
                    continue;
                }
            };

            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(kind) = classify(&entry) else {
                tracing::debug!(path = %path.display(), "skipping symlinked directory");
                continue;
            };

            let ignored = match kind {
                NodeKind::Directory => rules.ignores_directory(&name),
                NodeKind::File => rules.ignores_file(&path),
            };
            if ignored {
                continue;
            }

            entries.push(ScanEntry { name, path, kind });
        }

        entries.sort_by(|a, b| compare_names(OsStr::new(&a.name), OsStr::new(&b.name)));
        Ok(entries)
    }
}

/// Case-insensitive name order with a byte-wise tie break so the order is total.
pub fn compare_names(a: &OsStr, b: &OsStr) -> Ordering {
    let a = a.to_string_lossy();
    let b = b.to_string_lossy();
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(&b))
}

/// Directories are `Directory`, everything else a leaf. Symlinks to directories return `None`
/// because following them could loop forever during subtree expansion.
fn classify(entry: &fs::DirEntry) -> Option<NodeKind> {
    let file_type = entry.file_type().ok()?;
    if file_type.is_dir() {
        return Some(NodeKind::Directory);
    }
    if file_type.is_symlink() && entry.path().is_dir() {
        return None;
    }
    Some(NodeKind::File)
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;

    fn names(entries: &[ScanEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn sorts_case_insensitively_and_lists_one_level() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        fs::write(root.join("b.txt"), "b")?;
        fs::write(root.join("A.txt"), "a")?;
        fs::create_dir_all(root.join("Cdir/nested"))?;
        fs::write(root.join("Cdir/nested/deep.txt"), "deep")?;

        let entries = Scanner::new().scan(root, &IgnoreRules::default());
        assert_eq!(names(&entries), vec!["A.txt", "b.txt", "Cdir"]);
        assert_eq!(entries[2].kind, NodeKind::Directory);
        assert_eq!(entries[2].path, root.join("Cdir"));
        Ok(())
    }

    #[test]
    fn applies_extension_and_directory_rules() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        fs::write(root.join("keep.py"), "print(1)")?;
        fs::write(root.join("drop.PYC"), "bytecode")?;
        fs::create_dir_all(root.join("__pycache__"))?;
        fs::create_dir_all(root.join("src"))?;

        let entries = Scanner::new().scan(root, &IgnoreRules::standard());
        assert_eq!(names(&entries), vec!["keep.py", "src"]);
        Ok(())
    }

    #[test]
    fn unreadable_directory_is_tolerated() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let missing = temp.path().join("does-not-exist");

        let scanner = Scanner::new();
        assert!(scanner.try_scan(&missing, &IgnoreRules::default()).is_err());
        assert!(scanner.scan(&missing, &IgnoreRules::default()).is_empty());
        Ok(())
    }

    #[test]
    fn compare_names_is_total() {
        assert_eq!(
            compare_names(OsStr::new("readme"), OsStr::new("README")),
            Ordering::Greater
        );
        assert_eq!(
            compare_names(OsStr::new("alpha"), OsStr::new("Beta")),
            Ordering::Less
        );
    }
}
