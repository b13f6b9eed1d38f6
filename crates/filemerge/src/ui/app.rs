//! Command-line front end.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::app::merge::MergeError;
use crate::app::preferences::PreferenceStore;
use crate::app::report::ReportError;
use crate::app::session::Session;
use crate::domain::model::IgnorePreset;
use crate::infra::config::Config;
use crate::ui::components::file_tree::FileTree;
use crate::ui::components::summary::Summary;

const FALLBACK_PREFERENCES: &str = ".filemerge/preferences.json";

/// Select files from a directory tree and merge them into one text document.
#[derive(Parser, Debug)]
#[command(name = "filemerge")]
#[command(author, version, about, long_about = None)]
pub struct CliApp {
    /// Preferences file to read and write
    #[arg(long, global = true, value_name = "FILE")]
    pub prefs: Option<PathBuf>,

    /// Root directory (defaults to the saved root, then the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the selection tree
    Tree {
        /// Expand every directory before printing
        #[arg(long)]
        all: bool,
    },
    /// Toggle files or directories between selected and unselected
    Toggle {
        /// Paths, relative to the root or absolute
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List selected files in merge order
    Files,
    /// Print the structure report for the current selection
    Report {
        /// Include files skipped by extension
        #[arg(long)]
        show_ignored: bool,
    },
    /// Merge the selected files into one document
    Merge {
        /// Output file (defaults to the last output directory or the root)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Prefix every line with its number
        #[arg(long, conflicts_with = "no_line_numbers")]
        line_numbers: bool,

        #[arg(long)]
        no_line_numbers: bool,

        /// Embed the structure report before the file contents
        #[arg(long, conflicts_with = "no_structure")]
        structure: bool,

        #[arg(long)]
        no_structure: bool,

        /// List files skipped by extension in the embedded structure report
        #[arg(long, conflicts_with = "hide_ignored")]
        show_ignored: bool,

        #[arg(long)]
        hide_ignored: bool,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Inspect or change ignore rules
    Ignore {
        #[command(subcommand)]
        action: IgnoreAction,
    },
    /// Show size and modification time of a path
    Details { path: PathBuf },
    /// Print stored preferences as JSON
    Prefs,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum IgnoreAction {
    /// Show active ignore rules
    List,
    /// Ignore files with an extension
    Add { extension: String },
    /// Stop ignoring an extension
    Remove { extension: String },
    /// Replace ignored extensions with a preset
    Preset {
        #[arg(value_enum)]
        preset: IgnorePreset,
    },
    /// Ignore directories with this exact name
    DirAdd { name: String },
    /// Stop ignoring a directory name
    DirRemove { name: String },
}

impl CliApp {
    pub fn run(self) -> Result<()> {
        let CliApp {
            prefs,
            root,
            command,
            ..
        } = self;

        if let Command::Completions { shell } = command {
            let mut cmd = CliApp::command();
            clap_complete::generate(shell, &mut cmd, "filemerge", &mut io::stdout());
            return Ok(());
        }

        let config = Config::load()?;
        let store = PreferenceStore::new(preferences_path(prefs, &config));
        let mut session = Session::new(config, store);

        if let Command::Prefs = command {
            let json = serde_json::to_string_pretty(session.preferences())
                .context("failed to serialize preferences")?;
            println!("{json}");
            return Ok(());
        }

        open_root(&mut session, root.as_deref())?;
        session.reveal_saved_selection();

        let result = dispatch(&mut session, command);
        if let Some(message) = session.persist_error() {
            eprintln!("warning: {message}");
        }
        result
    }
}

fn preferences_path(explicit: Option<PathBuf>, config: &Config) -> PathBuf {
    explicit
        .or_else(|| config.storage.preferences_path().map(Path::to_path_buf))
        .or_else(PreferenceStore::default_path)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_PREFERENCES))
}

fn open_root(session: &mut Session, root: Option<&Path>) -> Result<()> {
    if let Some(root) = root {
        session.open(root)?;
        return Ok(());
    }
    if session.open_saved_root()?.is_none() {
        let cwd = env::current_dir().context("unable to determine working directory")?;
        session.open(cwd)?;
    }
    Ok(())
}

fn dispatch(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Tree { all } => {
            if all {
                session.expand_all()?;
            }
            print!("{}", FileTree.render(session.tree()));
            println!("{}", session.status_line());
        }
        Command::Toggle { paths } => {
            for path in paths {
                let state = session.toggle_path(&path)?;
                println!("{} {}", state.marker(), path.display());
            }
        }
        Command::Files => {
            let files = session.selected_files();
            if files.is_empty() {
                eprintln!("No files selected");
            }
            for file in files {
                println!("{}", file.display());
            }
        }
        Command::Report { show_ignored } => match session.structure_report(show_ignored) {
            Ok(report) => println!("{report}"),
            Err(ReportError::EmptyInput) => eprintln!("No files selected"),
        },
        Command::Merge {
            output,
            line_numbers,
            no_line_numbers,
            structure,
            no_structure,
            show_ignored,
            hide_ignored,
            quiet,
        } => {
            if let Some(value) = flag_pair(line_numbers, no_line_numbers) {
                session.set_include_line_numbers(value);
            }
            if let Some(value) = flag_pair(structure, no_structure) {
                session.set_include_structure(value);
            }
            if let Some(value) = flag_pair(show_ignored, hide_ignored) {
                session.set_include_ignored_in_structure(value);
            }
            run_merge(session, output, quiet)?;
        }
        Command::Ignore { action } => run_ignore(session, action)?,
        Command::Details { path } => println!("{}", session.file_details(&path)?),
        Command::Prefs | Command::Completions { .. } => {}
    }
    Ok(())
}

fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn run_merge(session: &mut Session, output: Option<PathBuf>, quiet: bool) -> Result<()> {
    let output = match output {
        Some(path) => std::path::absolute(&path)
            .with_context(|| format!("invalid output path {}", path.display()))?,
        None => session.default_output_path(),
    };

    let mut stderr = io::stderr();
    let result = session.merge_to_path(&output, |done, total| {
        if !quiet {
            let _ = write!(stderr, "\rMerging {done}/{total}");
            let _ = stderr.flush();
        }
    });
    if !quiet {
        eprintln!();
    }

    match result {
        Ok(report) => {
            if !quiet {
                print!("{}", Summary::new().render(&report));
            }
            Ok(())
        }
        Err(MergeError::EmptySelection) => bail!("No files selected"),
        Err(err) => Err(err).context("merge failed"),
    }
}

fn run_ignore(session: &mut Session, action: IgnoreAction) -> Result<()> {
    match action {
        IgnoreAction::List => {
            println!("{}", session.status_line());
            let directories: Vec<&str> = session.rules().directories().collect();
            if directories.is_empty() {
                println!("No ignored directories");
            } else {
                println!("Ignored directories: {}", directories.join(", "));
            }
        }
        IgnoreAction::Add { extension } => {
            if !session.ignore_extension(&extension)? {
                println!("{extension} is already ignored");
            }
            println!("{}", session.status_line());
        }
        IgnoreAction::Remove { extension } => {
            if !session.unignore_extension(&extension)? {
                println!("{extension} was not ignored");
            }
            println!("{}", session.status_line());
        }
        IgnoreAction::Preset { preset } => {
            session.apply_preset(preset)?;
            println!("Applied {preset} preset");
            println!("{}", session.status_line());
        }
        IgnoreAction::DirAdd { name } => {
            if !session.ignore_directory(&name)? {
                println!("{name} is already ignored");
            }
        }
        IgnoreAction::DirRemove { name } => {
            if !session.unignore_directory(&name)? {
                println!("{name} was not ignored");
            }
        }
    }
    Ok(())
}
