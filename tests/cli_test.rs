//! Command-line behaviour of the `c0-window` binary against the simulated device.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn ramp_csv(dir: &Path, rows: usize) -> std::path::PathBuf {
    let path = dir.join("input.csv");
    let body: String = (0..rows).map(|i| format!("{i},{i},{i}\n")).collect();
    std::fs::write(&path, body).unwrap();
    path
}

fn c0_window(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("c0-window").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("/dev/null")
        .arg("--config")
        .arg(config_dir.join("config.json"));
    cmd
}

#[test]
fn test_weighted_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = ramp_csv(dir.path(), 12);
    let output = dir.path().join("out.csv");

    c0_window(dir.path())
        .arg("weighted")
        .arg(&input)
        .arg("--simulate")
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("Read 12 rows from CSV file."));

    let text = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "4.5,4.5,4.5,6,6,6");
    assert_eq!(lines[2], "5.5,5.5,5.5,7,7,7");
}

#[test]
fn test_weighted_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = ramp_csv(dir.path(), 11);

    c0_window(dir.path())
        .args(["weighted", "--window-size", "10", "--simulate"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("averaged_x,"))
        .stdout(predicate::str::contains("4.5,4.5,4.5,6,6,6"));
}

#[test]
fn test_zero_window_size_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = ramp_csv(dir.path(), 12);

    c0_window(dir.path())
        .args(["weighted", "--window-size", "0", "--simulate"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("window size must be at least 1"));
}

#[test]
fn test_failed_run_prints_no_table() {
    let dir = tempfile::tempdir().unwrap();
    let input = ramp_csv(dir.path(), 1100);

    // 1100 values do not fit the 4096-byte simulated buffer
    c0_window(dir.path())
        .args(["weighted", "--window-size", "1100", "--simulate"])
        .arg(&input)
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("buffer overflow"));
}

#[test]
fn test_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.csv");

    c0_window(dir.path())
        .arg("weighted")
        .arg(dir.path().join("missing.csv"))
        .arg("--simulate")
        .arg("--output")
        .arg(&output)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Aborting."));

    assert!(!output.exists());
}

#[test]
fn test_status_simulated() {
    let dir = tempfile::tempdir().unwrap();

    c0_window(dir.path())
        .args(["status", "--simulate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("C0-microSD"))
        .stdout(predicate::str::contains("Ready for commands."));
}

#[test]
fn test_config_init_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();

    c0_window(dir.path())
        .args(["config", "--init"])
        .assert()
        .success();

    let text = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
    assert!(text.contains("\"window_size\": 10"));
}
