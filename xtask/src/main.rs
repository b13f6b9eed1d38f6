use anyhow::{Context, Result};
use cargo_metadata::MetadataCommand;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::Command;

const PACKAGE: &str = "filemerge";

#[derive(Parser)]
#[command(author, version, about = "Project automation commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cargo nextest with default configuration
    Nextest {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        release: bool,
    },
    /// Check formatting and run clippy with warnings denied
    Lint {
        /// Apply rustfmt instead of only checking
        #[arg(long)]
        fix: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Nextest { profile, release } => run_nextest(profile, release)?,
        Commands::Lint { fix } => run_lint(fix)?,
    }
    Ok(())
}

fn run_nextest(profile: Option<String>, release: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("nextest").arg("run").arg("-p").arg(PACKAGE);
    if let Some(profile) = profile {
        cmd.arg("--profile").arg(profile);
    }
    if release {
        cmd.arg("--release");
    }
    run(cmd, "cargo nextest run")
}

fn run_lint(fix: bool) -> Result<()> {
    let mut fmt = Command::new("cargo");
    fmt.arg("fmt").arg("--all");
    if !fix {
        fmt.arg("--").arg("--check");
    }
    run(fmt, "cargo fmt")?;

    let mut clippy = Command::new("cargo");
    clippy
        .arg("clippy")
        .arg("-p")
        .arg(PACKAGE)
        .arg("--all-targets")
        .arg("--")
        .arg("-D")
        .arg("warnings");
    run(clippy, "cargo clippy")
}

fn workspace_root() -> Result<PathBuf> {
    let metadata = MetadataCommand::new()
        .no_deps()
        .exec()
        .context("failed to read cargo metadata")?;
    if !metadata.packages.iter().any(|pkg| pkg.name == PACKAGE) {
        anyhow::bail!("package {PACKAGE} is not part of this workspace");
    }
    Ok(metadata.workspace_root.into_std_path_buf())
}

fn run(mut cmd: Command, label: &str) -> Result<()> {
    let status = cmd.current_dir(workspace_root()?).status()?;
    if !status.success() {
        anyhow::bail!("{label} failed");
    }
    Ok(())
}
