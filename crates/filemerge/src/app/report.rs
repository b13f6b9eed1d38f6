//! Structure report: an annotated walk of the disk below the selected files.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use thiserror::Error;

use crate::app::scan::compare_names;
use crate::domain::model::{IgnoreRules, extension_key};

const RULE_WIDTH: usize = 50;
const INDENT: &str = "    ";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("no files selected")]
    EmptyInput,
}

/// Counters accumulated while walking the common ancestor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub total_files: usize,
    pub included: usize,
    pub excluded: usize,
    pub ignored_by_extension: BTreeMap<String, usize>,
    pub directories: usize,
}

impl ReportStats {
    pub fn ignored(&self) -> usize {
        self.ignored_by_extension.values().sum()
    }
}

/// A rendered structure report together with the statistics it summarizes.
#[derive(Debug, Clone)]
pub struct StructureReport {
    pub base: PathBuf,
    pub entries: Vec<String>,
    pub stats: ReportStats,
}

impl StructureReport {
    /// Render the report text for `files`.
    pub fn generate(
        files: &[PathBuf],
        rules: &IgnoreRules,
        show_ignored: bool,
    ) -> Result<String, ReportError> {
        Ok(Self::build(files, rules, show_ignored)?.render())
    }

    /// Walk the disk from the common ancestor of `files` and classify every file found.
    pub fn build(
        files: &[PathBuf],
        rules: &IgnoreRules,
        show_ignored: bool,
    ) -> Result<Self, ReportError> {
        let base = common_ancestor(files).ok_or(ReportError::EmptyInput)?;
        let selected: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();

        let dir_rules = rules.clone();
        let walker = WalkBuilder::new(&base)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(compare_names)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && dir_rules.ignores_directory(&entry.file_name().to_string_lossy()))
            })
            .build();

        let mut entries = Vec::new();
        let mut stats = ReportStats::default();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable entry in structure report");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            let name = entry.file_name().to_string_lossy();
            let indent = INDENT.repeat(entry.depth());
            let Some(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                stats.directories += 1;
                entries.push(format!("{indent}[D] {name}/"));
                continue;
            }
            if file_type.is_symlink() && path.is_dir() {
                continue;
            }

            stats.total_files += 1;
            if rules.ignores_file(path) {
                let ext = extension_key(path).unwrap_or_default();
                *stats.ignored_by_extension.entry(ext).or_default() += 1;
                if show_ignored {
                    entries.push(format!("{indent}[x] {name}"));
                }
            } else if selected.contains(path) {
                stats.included += 1;
                let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
                entries.push(format!("{indent}[+] {name} ({} bytes)", group_thousands(size)));
            } else {
                stats.excluded += 1;
                entries.push(format!("{indent}[-] {name}"));
            }
        }

        Ok(Self {
            base,
            entries,
            stats,
        })
    }

    pub fn render(&self) -> String {
        let rule = "-".repeat(RULE_WIDTH);
        let root_name = self
            .base
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.base.display().to_string());

        let mut lines = Vec::with_capacity(self.entries.len() + 12);
        lines.push(format!("ROOT: {root_name}/"));
        lines.push(format!("Location: {}", self.base.display()));
        lines.push(rule.clone());
        lines.extend(self.entries.iter().cloned());
        lines.push(rule);
        lines.push("STATISTICS:".to_owned());
        lines.push(format!("  Total files seen: {}", self.stats.total_files));
        lines.push(format!("  Included files: {}", self.stats.included));
        lines.push(format!("  Excluded files: {}", self.stats.excluded));
        lines.push(format!("  Ignored by extension: {}", self.stats.ignored()));
        for (ext, count) in &self.stats.ignored_by_extension {
            lines.push(format!("    {ext}: {count}"));
        }
        lines.push(format!("  Directories scanned: {}", self.stats.directories));
        lines.join("\n")
    }
}

/// Deepest directory containing every path. A lone file resolves to its parent.
pub fn common_ancestor(files: &[PathBuf]) -> Option<PathBuf> {
    let (first, rest) = files.split_first()?;
    let mut prefix: Vec<Component<'_>> = first.components().collect();
    for path in rest {
        let shared = prefix
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        prefix.truncate(shared);
    }

    let ancestor: PathBuf = prefix.iter().collect();
    if ancestor.is_dir() {
        return Some(ancestor);
    }
    match ancestor.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
        _ => Some(ancestor),
    }
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use anyhow::Result;
    use tempfile::TempDir;

    fn fixture() -> Result<(TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let base = temp.path().join("project");
        fs::create_dir_all(base.join("src"))?;
        fs::create_dir_all(base.join(".git"))?;
        fs::write(base.join("a.txt"), "hello")?;
        fs::write(base.join("B.py"), "print(1)")?;
        fs::write(base.join("c.pyc"), "bytecode")?;
        fs::write(base.join("notes.md"), "notes")?;
        fs::write(base.join("src/main.rs"), "fn main() {}")?;
        fs::write(base.join("src/util.pyc"), "bytecode")?;
        fs::write(base.join(".git/HEAD"), "ref: refs/heads/main")?;
        Ok((temp, base))
    }

    fn selection(base: &Path) -> Vec<PathBuf> {
        vec![base.join("a.txt"), base.join("B.py"), base.join("src/main.rs")]
    }

    #[test]
    fn renders_annotated_tree_with_statistics() -> Result<()> {
        let (_temp, base) = fixture()?;
        let report = StructureReport::generate(&selection(&base), &IgnoreRules::standard(), true)?;
        let report = report.replace(&base.display().to_string(), "[TEMP]");

        insta::assert_snapshot!(report, @r"
ROOT: project/
Location: [TEMP]
--------------------------------------------------
    [+] a.txt (5 bytes)
    [+] B.py (8 bytes)
    [x] c.pyc
    [-] notes.md
    [D] src/
        [+] main.rs (12 bytes)
        [x] util.pyc
--------------------------------------------------
STATISTICS:
  Total files seen: 6
  Included files: 3
  Excluded files: 1
  Ignored by extension: 2
    .pyc: 2
  Directories scanned: 1
");
        Ok(())
    }

    #[test]
    fn hidden_ignored_entries_still_count() -> Result<()> {
        let (_temp, base) = fixture()?;
        let report = StructureReport::build(&selection(&base), &IgnoreRules::standard(), false)?;

        assert!(!report.entries.iter().any(|line| line.contains("[x]")));
        assert_eq!(report.stats.ignored(), 2);
        assert_eq!(report.stats.total_files, 6);
        assert_eq!(report.stats.directories, 1);
        Ok(())
    }

    #[test]
    fn empty_selection_is_an_error() {
        let err = StructureReport::generate(&[], &IgnoreRules::standard(), false).unwrap_err();
        assert_eq!(err, ReportError::EmptyInput);
    }

    #[test]
    fn single_file_uses_parent_directory() -> Result<()> {
        let (_temp, base) = fixture()?;
        let files = vec![base.join("src/main.rs")];
        assert_eq!(common_ancestor(&files), Some(base.join("src")));

        let report = StructureReport::build(&files, &IgnoreRules::standard(), false)?;
        assert_eq!(report.base, base.join("src"));
        assert_eq!(report.stats.included, 1);
        assert_eq!(report.stats.directories, 0);
        Ok(())
    }

    #[test]
    fn common_ancestor_of_siblings_and_cousins() {
        let files = vec![
            PathBuf::from("/work/app/src/a.rs"),
            PathBuf::from("/work/app/tests/b.rs"),
        ];
        assert_eq!(common_ancestor(&files), Some(PathBuf::from("/work/app")));
        assert_eq!(common_ancestor(&[]), None);
    }

    #[test]
    fn ignored_directories_are_not_walked() -> Result<()> {
        let (_temp, base) = fixture()?;
        let report = StructureReport::build(&selection(&base), &IgnoreRules::standard(), true)?;
        assert!(!report.entries.iter().any(|line| line.contains(".git")));
        assert!(!report.entries.iter().any(|line| line.contains("HEAD")));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_skipped() -> Result<()> {
        let (_temp, base) = fixture()?;
        std::os::unix::fs::symlink(base.join("src"), base.join("link"))?;
        let report = StructureReport::build(&selection(&base), &IgnoreRules::standard(), true)?;
        assert!(!report.entries.iter().any(|line| line.contains("link")));
        assert_eq!(report.stats.directories, 1);
        Ok(())
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
