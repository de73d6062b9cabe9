use std::fs;
use std::process::Command;

mod common;

fn record_file_sort() -> Command {
    Command::new(env!("CARGO_BIN_EXE_record-file-sort"))
}

#[test]
fn test_usage_error() -> Result<(), anyhow::Error> {
    let status = record_file_sort().status()?;
    assert!(!status.success());
    assert_eq!(status.code(), Some(2));

    let status = record_file_sort().args(["a", "b", "c"]).status()?;
    assert_eq!(status.code(), Some(2));
    Ok(())
}

#[test]
fn test_missing_input() -> Result<(), anyhow::Error> {
    common::setup();
    let dir = common::temp_dir("./target/results/");
    let output = record_file_sort()
        .arg(dir.join("missing.tsv"))
        .arg(dir.join("output.tsv"))
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("does not exist"));
    assert!(!dir.join("output.tsv").exists());
    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn test_sort() -> Result<(), anyhow::Error> {
    common::setup();
    let dir = common::temp_dir("./target/results/");
    let input_path = dir.join("input.tsv");
    let output_path = dir.join("output.tsv");
    fs::write(&input_path, "A\t100\tfoo\nB\t50\tbar\nA\t10\tbaz\n")?;

    let status = record_file_sort()
        .arg(&input_path)
        .arg(&output_path)
        .args(["--chunk-size-bytes", "10", "--tasks", "2", "--log-level", "warn"])
        .arg("--tmp-dir")
        .arg(&dir)
        .status()?;
    assert!(status.success());
    assert_eq!(fs::read_to_string(&output_path)?, "A\t10\tbaz\nA\t100\tfoo\nB\t50\tbar\n");

    let status = record_file_sort().arg(&output_path).arg("--check").status()?;
    assert!(status.success());
    let status = record_file_sort().arg(&input_path).arg("--check").status()?;
    assert_eq!(status.code(), Some(1));
    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn test_parse_error_exit_code() -> Result<(), anyhow::Error> {
    common::setup();
    let dir = common::temp_dir("./target/results/");
    let input_path = dir.join("input.tsv");
    let output_path = dir.join("output.tsv");
    fs::write(&input_path, "A\t100\tfoo\nB\n")?;

    let status = record_file_sort()
        .arg(&input_path)
        .arg(&output_path)
        .arg("--tmp-dir")
        .arg(&dir)
        .status()?;
    assert_eq!(status.code(), Some(1));
    assert!(!output_path.exists());
    assert_eq!(common::dir_entries(&dir)?, vec![input_path]);
    fs::remove_dir_all(dir)?;
    Ok(())
}
