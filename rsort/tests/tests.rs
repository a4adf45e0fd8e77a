use predicates::prelude::PredicateBooleanExt;
use std::os::unix::fs::PermissionsExt;

fn setup_test_env() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let tmp_dir = tempfile::tempdir().unwrap();
    let src = tmp_dir.path().join("src");
    let out = tmp_dir.path().join("out");
    std::fs::create_dir(&src).unwrap();
    (tmp_dir, src, out)
}

fn create_test_file(path: &std::path::Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn get_file_content(path: &std::path::Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn rsort(src: &std::path::Path, out: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("rsort").unwrap();
    cmd.env_remove("RUST_LOG").args([
        "--source",
        src.to_str().unwrap(),
        "--output",
        out.to_str().unwrap(),
    ]);
    cmd
}

fn count_entries(path: &std::path::Path) -> usize {
    std::fs::read_dir(path).unwrap().count()
}

#[test]
fn check_rsort_help() {
    let mut cmd = assert_cmd::Command::cargo_bin("rsort").unwrap();
    cmd.arg("--help").assert().success();
}

#[test]
fn test_sorts_by_lowercased_extension() {
    let (_tmp_dir, src, out) = setup_test_env();
    create_test_file(&src.join("a.TXT"), "a");
    create_test_file(&src.join("sub").join("b.txt"), "b");
    create_test_file(&src.join("c"), "c");
    rsort(&src, &out)
        .assert()
        .success()
        .stderr(predicates::str::contains("copied"));
    assert_eq!(get_file_content(&out.join("txt").join("a.TXT")), "a");
    assert_eq!(get_file_content(&out.join("txt").join("b.txt")), "b");
    assert_eq!(get_file_content(&out.join("no_extension").join("c")), "c");
    assert_eq!(count_entries(&out), 2);
    assert_eq!(count_entries(&out.join("txt")), 2);
    // the source is left untouched
    assert_eq!(get_file_content(&src.join("a.TXT")), "a");
}

#[test]
fn test_empty_source_warns() {
    let (_tmp_dir, src, out) = setup_test_env();
    rsort(&src, &out)
        .assert()
        .success()
        .stderr(predicates::str::contains("no files found in the source folder"));
    assert!(out.is_dir());
    assert_eq!(count_entries(&out), 0);
}

#[test]
fn test_missing_source_fails() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let src = tmp_dir.path().join("does-not-exist");
    let out = tmp_dir.path().join("nested").join("out");
    rsort(&src, &out)
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains("does not exist").count(1));
    assert!(out.is_dir());
    assert_eq!(count_entries(&out), 0);
}

#[test]
fn test_same_name_collision_keeps_one_copy() {
    let (_tmp_dir, src, out) = setup_test_env();
    create_test_file(&src.join("x").join("report.pdf"), "from x");
    create_test_file(&src.join("y").join("report.pdf"), "from y");
    rsort(&src, &out).assert().success();
    assert_eq!(count_entries(&out.join("pdf")), 1);
    let content = get_file_content(&out.join("pdf").join("report.pdf"));
    assert!(content == "from x" || content == "from y", "{content}");
}

#[test]
fn test_many_files_many_extensions() {
    let (_tmp_dir, src, out) = setup_test_env();
    for i in 0..500 {
        let dir = src.join(format!("d{}", i % 7));
        create_test_file(&dir.join(format!("f{i}.ext{}", i % 10)), &i.to_string());
    }
    rsort(&src, &out)
        .arg("--summary")
        .assert()
        .success()
        .stdout(
            predicates::str::contains("files copied: 500")
                .and(predicates::str::contains("files failed: 0")),
        );
    assert_eq!(count_entries(&out), 10);
    for i in 0..500 {
        let dst = out.join(format!("ext{}", i % 10)).join(format!("f{i}.ext{}", i % 10));
        assert_eq!(get_file_content(&dst), i.to_string());
    }
}

#[test]
fn test_throttled_run_completes() {
    let (_tmp_dir, src, out) = setup_test_env();
    for i in 0..50 {
        create_test_file(&src.join(format!("{i}.dat")), "x");
    }
    rsort(&src, &out)
        .args(["--max-open-files", "1", "--max-workers", "2"])
        .assert()
        .success();
    assert_eq!(count_entries(&out.join("dat")), 50);
}

#[test]
fn test_output_inside_source() {
    let (_tmp_dir, src, _) = setup_test_env();
    create_test_file(&src.join("a.md"), "a");
    let out = src.join("sorted");
    rsort(&src, &out).assert().success();
    rsort(&src, &out).assert().success();
    assert_eq!(get_file_content(&out.join("md").join("a.md")), "a");
    // the second run must not pick up the first run's output
    assert_eq!(count_entries(&out), 1);
    assert!(!out.join("md").join("sorted").exists());
}

#[test]
fn test_output_same_as_source() {
    let (_tmp_dir, src, _) = setup_test_env();
    for i in 0..200 {
        create_test_file(&src.join(format!("d{}", i % 4)).join(format!("{i}.e{}", i % 5)), "x");
    }
    for _ in 0..2 {
        rsort(&src, &src)
            .args(["--max-open-files", "4"])
            .assert()
            .success();
        for ext in 0..5 {
            assert_eq!(count_entries(&src.join(format!("e{ext}"))), 40);
        }
    }
    // d0..d3 plus five buckets
    assert_eq!(count_entries(&src), 9);
}

#[test]
fn test_rerun_into_existing_output() {
    let (_tmp_dir, src, out) = setup_test_env();
    create_test_file(&src.join("a.rs"), "fn main() {}");
    rsort(&src, &out).assert().success();
    rsort(&src, &out)
        .arg("--summary")
        .assert()
        .success()
        .stdout(predicates::str::contains("directories unchanged: 1"));
    assert_eq!(count_entries(&out.join("rs")), 1);
}

#[test]
fn test_keeps_permissions() {
    let (_tmp_dir, src, out) = setup_test_env();
    let file = src.join("run.sh");
    create_test_file(&file, "#!/bin/sh");
    std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o751)).unwrap();
    rsort(&src, &out).assert().success();
    let mode = std::fs::metadata(out.join("sh").join("run.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o7777, 0o751);
}

#[test]
fn test_bucket_blocked_by_file_fails_softly() {
    let (_tmp_dir, src, out) = setup_test_env();
    create_test_file(&src.join("a.txt"), "a");
    create_test_file(&src.join("b.jpg"), "b");
    // a regular file where the `txt` bucket directory should go
    create_test_file(&out.join("txt"), "in the way");
    rsort(&src, &out)
        .arg("--summary")
        .assert()
        .failure()
        .code(1)
        .stderr(
            predicates::str::contains("cannot create directory for bucket 'txt'")
                .and(predicates::str::contains("files failed: 1")),
        );
    assert_eq!(get_file_content(&out.join("jpg").join("b.jpg")), "b");
    assert_eq!(get_file_content(&out.join("txt")), "in the way");
}

#[test]
fn test_quiet_suppresses_logs() {
    let (_tmp_dir, src, out) = setup_test_env();
    create_test_file(&src.join("a.txt"), "a");
    rsort(&src, &out)
        .arg("--quiet")
        .assert()
        .success()
        .stderr(predicates::str::is_empty())
        .stdout(predicates::str::is_empty());
}

#[test]
fn test_progress_reports_final_state() {
    let (_tmp_dir, src, out) = setup_test_env();
    create_test_file(&src.join("a.txt"), "a");
    rsort(&src, &out)
        .args(["--progress-delay", "50ms"])
        .assert()
        .success()
        .stderr(predicates::str::contains("found: 1 copied: 1 failed: 0"));
}

#[test]
fn test_invalid_progress_delay_fails() {
    let (_tmp_dir, src, out) = setup_test_env();
    rsort(&src, &out)
        .args(["--progress-delay", "later"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid progress delay"));
}
