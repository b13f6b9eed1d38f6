use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = temp.path().join("project");
        fs::create_dir_all(project.join("src")).expect("create src");
        fs::write(project.join("a.txt"), "hello").expect("write a.txt");
        fs::write(project.join("b.py"), "print(1)").expect("write b.py");
        fs::write(project.join("c.pyc"), "bytecode").expect("write c.pyc");
        fs::write(project.join("src/main.rs"), "fn main() {}\n").expect("write main.rs");
        fs::create_dir_all(temp.path().join("home")).expect("create home");
        Self { temp }
    }

    fn project(&self) -> PathBuf {
        fs::canonicalize(self.temp.path().join("project")).expect("canonical project")
    }

    fn prefs(&self) -> PathBuf {
        self.temp.path().join("prefs.json")
    }

    fn cmd(&self) -> Command {
        let home = self.temp.path().join("home");
        let mut cmd = Command::cargo_bin("filemerge").expect("binary exists");
        cmd.current_dir(self.temp.path())
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env_remove("FILEMERGE_PREFERENCES")
            .env_remove("FILEMERGE_CHUNK_SIZE")
            .env_remove("FILEMERGE_LOG")
            .arg("--prefs")
            .arg(self.prefs())
            .arg("--root")
            .arg(self.project());
        cmd
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read file")
}

#[test]
fn help_displays_usage() {
    Command::cargo_bin("filemerge")
        .expect("binary exists")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn tree_hides_ignored_entries() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["tree", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt"))
        .stdout(predicate::str::contains("main.rs"))
        .stdout(predicate::str::contains("c.pyc").not())
        .stdout(predicate::str::contains("Ignoring: "));
}

#[test]
fn selection_persists_between_runs() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["toggle", "a.txt", "src"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[x] a.txt"))
        .stdout(predicate::str::contains("[x] src"));

    let project = ws.project();
    let expected = format!(
        "{}\n{}\n",
        project.join("a.txt").display(),
        project.join("src/main.rs").display()
    );
    ws.cmd().arg("files").assert().success().stdout(expected);

    let prefs = read(&ws.prefs());
    assert!(prefs.contains("selected_paths"));
    assert!(prefs.contains("a.txt"));
}

#[test]
fn merge_writes_output_file() {
    let ws = Workspace::new();
    ws.cmd().args(["toggle", "a.txt", "b.py"]).assert().success();

    let output = ws.temp.path().join("merged.txt");
    ws.cmd()
        .args(["merge", "--no-structure", "--line-numbers", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged 2 of 2 files"));

    let merged = read(&output);
    assert!(merged.starts_with("MERGED FILES\n"));
    assert!(merged.contains("### 1/2: a.txt"));
    assert!(merged.contains("0001| hello\n"));
    assert!(merged.contains("### END OF FILE: b.py"));
    assert!(!merged.contains("FILE STRUCTURE OVERVIEW"));
}

#[test]
fn merge_can_list_ignored_files_and_remembers_it() {
    let ws = Workspace::new();
    ws.cmd().args(["toggle", "a.txt"]).assert().success();

    let output = ws.temp.path().join("merged.txt");
    ws.cmd()
        .args(["merge", "--quiet", "--structure", "--show-ignored", "-o"])
        .arg(&output)
        .assert()
        .success();
    assert!(read(&output).contains("[x] c.pyc"));
    assert!(read(&ws.prefs()).contains("\"include_ignored_in_structure\": true"));

    ws.cmd()
        .args(["merge", "--quiet", "-o"])
        .arg(&output)
        .assert()
        .success();
    assert!(read(&output).contains("[x] c.pyc"));

    ws.cmd()
        .args(["merge", "--quiet", "--hide-ignored", "-o"])
        .arg(&output)
        .assert()
        .success();
    assert!(!read(&output).contains("c.pyc"));
}

#[test]
fn merge_without_selection_fails() {
    let ws = Workspace::new();
    let output = ws.temp.path().join("merged.txt");
    ws.cmd()
        .args(["merge", "-o"])
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No files selected"));
    assert!(!output.exists());
}

#[test]
fn report_lists_ignored_files_on_request() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["toggle", "c.pyc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot select"));
    ws.cmd().args(["toggle", "."]).assert().success();

    ws.cmd()
        .args(["report", "--show-ignored"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[+] a.txt (5 bytes)"))
        .stdout(predicate::str::contains("[x] c.pyc"))
        .stdout(predicate::str::contains("STATISTICS:"));
}

#[test]
fn ignore_changes_are_saved() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["ignore", "add", "TXT"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".txt"));

    ws.cmd()
        .args(["tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt").not());

    ws.cmd()
        .args(["ignore", "remove", ".txt"])
        .assert()
        .success();
    ws.cmd()
        .args(["ignore", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ignored directories: "));
}

#[test]
fn completions_are_generated() {
    Command::cargo_bin("filemerge")
        .expect("binary exists")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("filemerge"));
}
