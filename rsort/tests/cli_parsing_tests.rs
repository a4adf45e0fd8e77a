//! CLI Argument Parsing Compatibility Tests for rsort
//!
//! These tests verify that command-line arguments are parsed correctly and maintain
//! backward compatibility. The focus is on flag names, short aliases and value formats.

use assert_cmd::Command;

#[test]
fn test_help_runs() {
    Command::cargo_bin("rsort")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("--source"))
        .stdout(predicates::str::contains("--output"));
}

#[test]
fn test_version_runs() {
    Command::cargo_bin("rsort")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

// ============================================================================
// Required Arguments
// ============================================================================

#[test]
fn test_missing_source_is_rejected() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args(["--output", "/tmp/out"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("--source"));
}

#[test]
fn test_missing_output_is_rejected() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args(["--source", "/tmp/src"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("--output"));
}

#[test]
fn test_short_aliases() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args(["-s", "/tmp/src", "-o", "/tmp/out", "-p", "-q", "--help"])
        .assert()
        .success();
}

// ============================================================================
// Progress & Output Arguments
// ============================================================================

#[test]
fn test_progress_delay_formats() {
    for delay in ["200ms", "10s", "5min", "1h 30m"] {
        Command::cargo_bin("rsort")
            .unwrap()
            .args(["--progress-delay", delay, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_verbose_count() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args(["-vv", "--summary", "--help"])
        .assert()
        .success();
}

// ============================================================================
// Throttling Arguments
// ============================================================================

#[test]
fn test_throttle_values() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args([
            "--max-open-files",
            "0",
            "--ops-throttle",
            "100",
            "--max-workers",
            "4",
            "--max-blocking-threads",
            "16",
            "--help",
        ])
        .assert()
        .success();
}

#[test]
fn test_negative_max_open_files_is_rejected() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args([
            "--source",
            "/tmp/src",
            "--output",
            "/tmp/out",
            "--max-open-files",
            "-1",
        ])
        .assert()
        .failure();
}

#[test]
fn test_non_numeric_ops_throttle_is_rejected() {
    Command::cargo_bin("rsort")
        .unwrap()
        .args([
            "--source",
            "/tmp/src",
            "--output",
            "/tmp/out",
            "--ops-throttle",
            "fast",
        ])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid value"));
}
