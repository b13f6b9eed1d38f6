use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use filemerge::app::merge::{FileOutcome, MergeEngine, MergeJob, MergeOptions};
use filemerge::app::tree::SelectionTree;
use filemerge::domain::model::IgnoreRules;

fn plain_options() -> MergeOptions {
    MergeOptions {
        include_structure: false,
        ..MergeOptions::default()
    }
}

fn merge_to_string(job: &MergeJob) -> Result<String> {
    let mut out = Vec::new();
    MergeEngine::new().merge(job, &mut out, |_, _| {})?;
    Ok(String::from_utf8(out)?)
}

fn select_all(root: &Path) -> Result<Vec<PathBuf>> {
    let mut tree = SelectionTree::new(IgnoreRules::standard());
    let id = tree.build_root(root)?;
    tree.expand(id)?;
    tree.toggle(id)?;
    Ok(tree.selected_leaf_files())
}

fn without_timestamp(output: &str) -> String {
    output
        .lines()
        .filter(|line| !line.starts_with("Generated: "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn merges_selected_files_in_name_order_without_ignored_ones() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    fs::write(root.join("b.py"), "print(1)")?;
    fs::write(root.join("a.txt"), "hello")?;
    fs::write(root.join("c.pyc"), "bytecode")?;

    let files = select_all(root)?;
    assert_eq!(files, vec![root.join("a.txt"), root.join("b.py")]);

    let output = merge_to_string(&MergeJob::new(files, plain_options()))?;
    let rule = "#".repeat(40);
    let a_block = format!("{rule}\n### 1/2: a.txt\n");
    let b_block = format!("{rule}\n### 2/2: b.py\n");
    let a_at = output.find(&a_block).expect("a.txt block");
    let b_at = output.find(&b_block).expect("b.py block");
    assert!(a_at < b_at);

    assert!(output.contains(&format!("hello\n{rule}\n### END OF FILE: a.txt\n{rule}\n")));
    assert!(output.contains(&format!("print(1)\n{rule}\n### END OF FILE: b.py\n{rule}\n")));
    assert!(!output.contains("c.pyc"));
    Ok(())
}

#[test]
fn numbering_restarts_for_each_file() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    fs::write(root.join("one.txt"), "first\nsecond\nthird\n")?;
    fs::write(root.join("two.txt"), "again\n")?;

    let job = MergeJob::new(
        vec![root.join("one.txt"), root.join("two.txt")],
        MergeOptions {
            include_line_numbers: true,
            ..plain_options()
        },
    );
    let output = merge_to_string(&job)?;

    assert!(output.contains("0001| first\n0002| second\n0003| third\n"));
    assert!(output.contains("### 2/2: two.txt"));
    let second = output
        .split("### 2/2: two.txt")
        .nth(1)
        .expect("second block");
    assert!(second.contains("0001| again\n"));
    Ok(())
}

#[test]
fn file_deleted_mid_batch_gets_an_error_marker() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    let files: Vec<PathBuf> = (1..=4).map(|idx| root.join(format!("f{idx}.txt"))).collect();
    for (idx, file) in files.iter().enumerate() {
        fs::write(file, format!("content {}\n", idx + 1))?;
    }

    let doomed = files[2].clone();
    let mut out = Vec::new();
    let mut seen = Vec::new();
    let report = MergeEngine::new().merge(
        &MergeJob::new(files.clone(), plain_options()),
        &mut out,
        |done, total| {
            seen.push((done, total));
            if done == 2 {
                fs::remove_file(&doomed).expect("remove third file");
            }
        },
    )?;
    let output = String::from_utf8(out)?;

    assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    for idx in 1..=4 {
        assert!(output.contains(&format!("### {idx}/4: f{idx}.txt")));
        assert!(output.contains(&format!("### END OF FILE: f{idx}.txt")));
    }
    let third = output
        .split("### 3/4: f3.txt")
        .nth(1)
        .and_then(|rest| rest.split("### END OF FILE: f3.txt").next())
        .expect("third block");
    assert!(third.contains("!!! ERROR: "));
    assert!(output.contains("content 4\n"));

    assert_eq!(report.merged_count(), 3);
    assert!(matches!(report.files[2].outcome, FileOutcome::Failed { .. }));
    Ok(())
}

#[test]
fn output_is_deterministic_apart_from_the_timestamp() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    fs::create_dir_all(root.join("src"))?;
    fs::write(root.join("README.md"), "# title\n")?;
    fs::write(root.join("src/lib.rs"), "pub fn f() {}\n")?;

    let files = select_all(root)?;
    let job = MergeJob::new(
        files,
        MergeOptions {
            include_structure: true,
            include_line_numbers: true,
            ..MergeOptions::default()
        },
    );

    let first = merge_to_string(&job)?;
    let second = merge_to_string(&job)?;
    assert_eq!(without_timestamp(&first), without_timestamp(&second));
    assert!(first.contains("FILE STRUCTURE OVERVIEW\n"));
    assert!(first.contains("[+] lib.rs (14 bytes)"));
    Ok(())
}

#[test]
fn utf16_and_legacy_files_are_transcoded() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();

    let mut utf16 = vec![0xFF, 0xFE];
    for unit in "wide text\n".encode_utf16() {
        utf16.extend_from_slice(&unit.to_le_bytes());
    }
    fs::write(root.join("wide.txt"), utf16)?;
    fs::write(root.join("latin.txt"), b"na\xefve\n")?;
    fs::write(root.join("bom.txt"), b"\xef\xbb\xbfbom\n")?;

    let job = MergeJob::new(
        vec![root.join("bom.txt"), root.join("latin.txt"), root.join("wide.txt")],
        plain_options(),
    );
    let output = merge_to_string(&job)?;
    assert!(output.contains("\nbom\n"));
    assert!(!output.contains('\u{FEFF}'));
    assert!(output.contains("naïve\n"));
    assert!(output.contains("wide text\n"));
    Ok(())
}
