//! Merge engine: streams selected files into a single text document.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::encoding::{self, DecodeError, Decoder, TextEncoding};
use crate::app::report::{StructureReport, group_thousands};
use crate::domain::model::IgnoreRules;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const MIN_CHUNK_SIZE: usize = 512;
pub const DEFAULT_LINE_NUMBER_WIDTH: usize = 4;

const RULE_WIDTH: usize = 40;

/// Formatting and streaming options for one merge.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub include_structure: bool,
    pub include_line_numbers: bool,
    /// List ignored files in the embedded structure report.
    pub show_ignored: bool,
    pub rules: IgnoreRules,
    pub chunk_size: usize,
    pub line_number_width: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            include_structure: true,
            include_line_numbers: false,
            show_ignored: false,
            rules: IgnoreRules::standard(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            line_number_width: DEFAULT_LINE_NUMBER_WIDTH,
        }
    }
}

/// Frozen snapshot of what to merge. The file order is the output order.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub files: Vec<PathBuf>,
    pub options: MergeOptions,
}

impl MergeJob {
    pub fn new(files: Vec<PathBuf>, options: MergeOptions) -> Self {
        Self { files, options }
    }
}

/// A failure confined to one input file. Recorded inline; the merge continues.
#[derive(Debug, Error)]
pub enum FileMergeError {
    #[error("cannot read file metadata: {0}")]
    Metadata(#[source] io::Error),
    #[error("not a regular file")]
    NotAFile,
    #[error("cannot open file: {0}")]
    Open(#[source] io::Error),
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failures that abort the whole merge.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no files selected")]
    EmptySelection,
    #[error("failed to write merged output: {0}")]
    Write(#[source] io::Error),
    #[error("failed to write merged output to {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("merge cancelled after {completed} of {total} files")]
    Cancelled { completed: usize, total: usize },
}

impl MergeError {
    fn at_path(self, path: &Path) -> Self {
        match self {
            MergeError::Write(source) => MergeError::Sink {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Merged {
        encoding: TextEncoding,
        bytes: u64,
        lines: u64,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Summary of a completed merge.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub files: Vec<FileRecord>,
    pub total_bytes: u64,
    pub structure_included: bool,
    pub output: Option<PathBuf>,
}

impl MergeReport {
    pub fn merged_count(&self) -> usize {
        self.files
            .iter()
            .filter(|record| matches!(record.outcome, FileOutcome::Merged { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.files.iter().filter_map(|record| match &record.outcome {
            FileOutcome::Failed { message } => Some((record.path.as_path(), message.as_str())),
            FileOutcome::Merged { .. } => None,
        })
    }
}

enum CopyError {
    File(FileMergeError),
    Sink(io::Error),
}

impl From<FileMergeError> for CopyError {
    fn from(err: FileMergeError) -> Self {
        CopyError::File(err)
    }
}

impl From<DecodeError> for CopyError {
    fn from(err: DecodeError) -> Self {
        CopyError::File(FileMergeError::Decode(err))
    }
}

/// Writes merged documents. Cancellation is observed between files only.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    cancel: Arc<AtomicBool>,
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an externally owned cancellation flag.
    pub fn with_cancel_flag(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Stream the job into `sink`, invoking `progress(done, total)` after every file.
    ///
    /// A cancellation requested before the merge starts is discarded.
    pub fn merge<W, P>(
        &self,
        job: &MergeJob,
        sink: W,
        mut progress: P,
    ) -> Result<MergeReport, MergeError>
    where
        W: Write,
        P: FnMut(usize, usize),
    {
        if job.files.is_empty() {
            return Err(MergeError::EmptySelection);
        }
        self.cancel.store(false, Ordering::Relaxed);

        let options = &job.options;
        let total = job.files.len();
        let mut out = TrackedWriter::new(sink);
        let total_bytes: u64 = job
            .files
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum();

        write_header(&mut out, total, total_bytes).map_err(MergeError::Write)?;
        if options.include_structure {
            let structure =
                StructureReport::generate(&job.files, &options.rules, options.show_ignored)
                    .unwrap_or_else(|err| err.to_string());
            write_structure(&mut out, &structure).map_err(MergeError::Write)?;
        }

        let mut report = MergeReport {
            files: Vec::with_capacity(total),
            total_bytes,
            structure_included: options.include_structure,
            output: None,
        };

        for (idx, path) in job.files.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::info!(completed = idx, total, "merge cancelled");
                return Err(MergeError::Cancelled {
                    completed: idx,
                    total,
                });
            }

            let name = display_name(path);
            let metadata = fs::metadata(path);
            write_file_header(&mut out, idx + 1, total, &name, path, metadata.as_ref().ok())
                .map_err(MergeError::Write)?;

            let outcome = match metadata
                .map_err(FileMergeError::Metadata)
                .map_err(CopyError::File)
                .and_then(|meta| copy_file(path, &meta, options, &mut out))
            {
                Ok(outcome) => outcome,
                Err(CopyError::Sink(err)) => return Err(MergeError::Write(err)),
                Err(CopyError::File(err)) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to merge file");
                    out.ensure_line_start().map_err(MergeError::Write)?;
                    writeln!(out, "!!! ERROR: {err}").map_err(MergeError::Write)?;
                    FileOutcome::Failed {
                        message: err.to_string(),
                    }
                }
            };

            out.ensure_line_start().map_err(MergeError::Write)?;
            write_file_footer(&mut out, &name).map_err(MergeError::Write)?;
            report.files.push(FileRecord {
                path: path.clone(),
                outcome,
            });
            progress(idx + 1, total);
        }

        out.flush().map_err(MergeError::Write)?;
        tracing::info!(
            files = total,
            merged = report.merged_count(),
            bytes = total_bytes,
            "merge finished"
        );
        Ok(report)
    }

    /// Merge into `output` through a temporary file in the same directory. Nothing is left at
    /// `output` unless the merge completes.
    pub fn merge_to_path<P>(
        &self,
        job: &MergeJob,
        output: &Path,
        progress: P,
    ) -> Result<MergeReport, MergeError>
    where
        P: FnMut(usize, usize),
    {
        if job.files.is_empty() {
            return Err(MergeError::EmptySelection);
        }

        let sink_error = |source: io::Error| MergeError::Sink {
            path: output.to_path_buf(),
            source,
        };

        let parent = output
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(sink_error)?;
        let temp = NamedTempFile::new_in(parent).map_err(sink_error)?;

        let mut writer = BufWriter::new(temp);
        let mut report = self
            .merge(job, &mut writer, progress)
            .map_err(|err| err.at_path(output))?;

        let temp = writer
            .into_inner()
            .map_err(|err| sink_error(err.into_error()))?;
        temp.persist(output).map_err(|err| sink_error(err.error))?;

        tracing::debug!(output = %output.display(), "persisted merged output");
        report.output = Some(output.to_path_buf());
        Ok(report)
    }
}

fn copy_file<W: Write>(
    path: &Path,
    metadata: &fs::Metadata,
    options: &MergeOptions,
    out: &mut TrackedWriter<W>,
) -> Result<FileOutcome, CopyError> {
    if metadata.is_dir() {
        return Err(FileMergeError::NotAFile.into());
    }

    let chunk_size = options.chunk_size.max(MIN_CHUNK_SIZE);
    let encoding = {
        let mut file = File::open(path).map_err(FileMergeError::Open)?;
        encoding::detect_encoding(&mut file, chunk_size).map_err(FileMergeError::Read)?
    };
    tracing::debug!(path = %path.display(), %encoding, "detected file encoding");

    let mut file = File::open(path).map_err(FileMergeError::Open)?;
    let mut decoder = Decoder::new(encoding);
    let mut numbers = options
        .include_line_numbers
        .then(|| LineNumbers::new(options.line_number_width));

    let mut buf = vec![0; chunk_size];
    let mut decoded = String::with_capacity(chunk_size);
    let mut text = String::with_capacity(chunk_size);
    let mut endings = LineEndings::default();
    let mut bytes = 0u64;
    let mut newlines = 0u64;
    let mut open_line = false;
    loop {
        let read = encoding::read_chunk(&mut file, &mut buf).map_err(FileMergeError::Read)?;
        decoded.clear();
        text.clear();
        if read == 0 {
            decoder.finish(&mut decoded)?;
            endings.normalize(&decoded, &mut text);
            endings.finish(&mut text);
        } else {
            bytes += read as u64;
            decoder.decode_chunk(&buf[..read], &mut decoded)?;
            endings.normalize(&decoded, &mut text);
        }

        if !text.is_empty() {
            newlines += text.matches('\n').count() as u64;
            open_line = !text.ends_with('\n');
        }
        let written = match numbers.as_mut() {
            Some(numbers) => numbers.write(&text, out),
            None => out.write_all(text.as_bytes()),
        };
        written.map_err(CopyError::Sink)?;

        if read == 0 {
            break;
        }
    }

    Ok(FileOutcome::Merged {
        encoding,
        bytes,
        lines: newlines + u64::from(open_line),
    })
}

/// Rewrites `\r\n` and lone `\r` as `\n`. A trailing `\r` is held back until the next chunk
/// shows whether it starts a `\r\n` pair.
#[derive(Debug, Default)]
struct LineEndings {
    pending_cr: bool,
}

impl LineEndings {
    fn normalize(&mut self, text: &str, out: &mut String) {
        for ch in text.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                out.push('\n');
                if ch == '\n' {
                    continue;
                }
            }
            if ch == '\r' {
                self.pending_cr = true;
            } else {
                out.push(ch);
            }
        }
    }

    fn finish(&mut self, out: &mut String) {
        if std::mem::take(&mut self.pending_cr) {
            out.push('\n');
        }
    }
}

/// Prefixes every line with a zero-padded, 1-based counter.
struct LineNumbers {
    width: usize,
    next: u64,
    at_line_start: bool,
}

impl LineNumbers {
    fn new(width: usize) -> Self {
        Self {
            width,
            next: 1,
            at_line_start: true,
        }
    }

    fn write<W: Write>(&mut self, text: &str, out: &mut W) -> io::Result<()> {
        for piece in text.split_inclusive('\n') {
            if self.at_line_start {
                write!(out, "{:0width$}| ", self.next, width = self.width)?;
                self.next += 1;
            }
            out.write_all(piece.as_bytes())?;
            self.at_line_start = piece.ends_with('\n');
        }
        Ok(())
    }
}

/// Remembers whether the last byte written ended a line.
struct TrackedWriter<W> {
    inner: W,
    at_line_start: bool,
}

impl<W: Write> TrackedWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            at_line_start: true,
        }
    }

    fn ensure_line_start(&mut self) -> io::Result<()> {
        if self.at_line_start {
            Ok(())
        } else {
            self.write_all(b"\n")
        }
    }
}

impl<W: Write> Write for TrackedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        if written > 0 {
            self.at_line_start = buf[written - 1] == b'\n';
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn write_header<W: Write>(out: &mut W, total: usize, total_bytes: u64) -> io::Result<()> {
    let generated = format_timestamp(OffsetDateTime::now_utc());
    writeln!(out, "MERGED FILES")?;
    writeln!(out, "Generated: {generated}")?;
    writeln!(out, "Files: {total}")?;
    writeln!(out, "Total size: {} bytes", group_thousands(total_bytes))?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out)
}

fn write_structure<W: Write>(out: &mut W, structure: &str) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "FILE STRUCTURE OVERVIEW")?;
    writeln!(out, "{rule}")?;
    writeln!(out, "{structure}")?;
    writeln!(out, "{rule}")?;
    writeln!(out)
}

fn write_file_header<W: Write>(
    out: &mut W,
    index: usize,
    total: usize,
    name: &str,
    path: &Path,
    metadata: Option<&fs::Metadata>,
) -> io::Result<()> {
    let rule = "#".repeat(RULE_WIDTH);
    writeln!(out, "{rule}")?;
    writeln!(out, "### {index}/{total}: {name}")?;
    writeln!(out, "### Path: {}", path.display())?;
    match metadata {
        Some(meta) => {
            let modified = meta
                .modified()
                .map(format_system_time)
                .unwrap_or_else(|_| "unknown".to_owned());
            writeln!(
                out,
                "### Size: {} bytes | Modified: {modified}",
                group_thousands(meta.len())
            )?;
        }
        None => writeln!(out, "### Size: unavailable")?,
    }
    writeln!(out, "{rule}")
}

fn write_file_footer<W: Write>(out: &mut W, name: &str) -> io::Result<()> {
    let rule = "#".repeat(RULE_WIDTH);
    writeln!(out, "{rule}")?;
    writeln!(out, "### END OF FILE: {name}")?;
    writeln!(out, "{rule}")?;
    writeln!(out)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// RFC 3339 in UTC, truncated to whole seconds.
pub fn format_system_time(time: SystemTime) -> String {
    format_timestamp(OffsetDateTime::from(time))
}

fn format_timestamp(time: OffsetDateTime) -> String {
    let time = time.replace_nanosecond(0).unwrap_or(time);
    time.format(&Rfc3339)
        .unwrap_or_else(|_| time.unix_timestamp().to_string())
}
