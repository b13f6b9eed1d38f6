//! Merge summary rendering.

use std::fmt::Write as _;

use crate::app::encoding::TextEncoding;
use crate::app::merge::{FileOutcome, MergeReport};
use crate::app::report::group_thousands;

/// Describes a finished merge for the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary;

impl Summary {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, report: &MergeReport) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "Merged {} of {} files ({} bytes)",
            report.merged_count(),
            report.files.len(),
            group_thousands(report.total_bytes)
        );
        if let Some(path) = &report.output {
            let _ = write!(out, " into {}", path.display());
        }
        out.push('\n');

        for record in &report.files {
            if let FileOutcome::Merged { encoding, .. } = record.outcome
                && encoding != TextEncoding::Utf8
            {
                let _ = writeln!(out, "  decoded {} as {encoding}", record.path.display());
            }
        }

        let failures: Vec<_> = report.failures().collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "Failed ({}):", failures.len());
            for (path, message) in failures {
                let _ = writeln!(out, "  {}: {message}", path.display());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::app::merge::FileRecord;

    #[test]
    fn lists_failures_and_fallback_encodings() {
        let report = MergeReport {
            files: vec![
                FileRecord {
                    path: PathBuf::from("/p/a.txt"),
                    outcome: FileOutcome::Merged {
                        encoding: TextEncoding::Utf8,
                        bytes: 5,
                        lines: 1,
                    },
                },
                FileRecord {
                    path: PathBuf::from("/p/legacy.txt"),
                    outcome: FileOutcome::Merged {
                        encoding: TextEncoding::Windows1252,
                        bytes: 1_200,
                        lines: 3,
                    },
                },
                FileRecord {
                    path: PathBuf::from("/p/gone.txt"),
                    outcome: FileOutcome::Failed {
                        message: "cannot open file".into(),
                    },
                },
            ],
            total_bytes: 1_205,
            structure_included: false,
            output: Some(PathBuf::from("/p/merged_files.txt")),
        };

        insta::assert_snapshot!(Summary::new().render(&report), @r"
Merged 2 of 3 files (1,205 bytes) into /p/merged_files.txt
  decoded /p/legacy.txt as windows-1252
Failed (1):
  /p/gone.txt: cannot open file
");
    }
}
