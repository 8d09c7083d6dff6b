//! CLI integration tests for slated
//!
//! These tests drive the binary against a temporary vault, checking that the
//! commands leave the notes in the expected state.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a command instance for the slated binary
fn slated_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("slated"));
    cmd.env_remove("SLATED_VAULT").env_remove("RUST_LOG");
    cmd
}

/// Create a temporary directory and initialize a vault
fn setup_vault() -> TempDir {
    let dir = TempDir::new().unwrap();
    slated_cmd().arg("init").arg(dir.path()).assert().success();
    dir
}

fn write_note(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(format!("{}.md", name)), text).unwrap();
}

fn read_note(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(format!("{}.md", name))).unwrap()
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_init_creates_config() {
    let dir = TempDir::new().unwrap();

    slated_cmd()
        .arg("init")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized slated vault"));

    assert!(dir.path().join(".slated").is_dir());
    assert!(dir.path().join(".slated/config.toml").is_file());
}

#[test]
fn test_init_is_idempotent() {
    let dir = TempDir::new().unwrap();

    slated_cmd().arg("init").arg(dir.path()).assert().success();
    slated_cmd().arg("init").arg(dir.path()).assert().success();
}

#[test]
fn test_commands_require_vault() {
    let dir = TempDir::new().unwrap();

    slated_cmd()
        .current_dir(dir.path())
        .args(["tasks", "today"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("slated init"));
}

// =============================================================================
// Process Tests
// =============================================================================

#[test]
fn test_process_writes_next_occurrence() {
    let dir = setup_vault();
    write_note(
        dir.path(),
        "2020-12-31",
        "## Tasks\n\n- [ ] a test task ; Every Sunday\n",
    );

    slated_cmd()
        .current_dir(dir.path())
        .args(["process", "2020-12-31"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2021-01-03"));

    let source = read_note(dir.path(), "2020-12-31");
    assert!(source.starts_with("## Tasks\n\n- [ ] a test task ; Every Sunday ^task-"));

    let anchor = source.trim_end().rsplit('^').next().unwrap().to_string();
    assert_eq!(
        read_note(dir.path(), "2021-01-03"),
        format!(
            "## Tasks\n\n- [ ] a test task ; Every Sunday [[2020-12-31#^{}|<< Origin]]\n",
            anchor
        )
    );
}

#[test]
fn test_process_is_idempotent() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [ ] standup ; every day\n");

    slated_cmd()
        .current_dir(dir.path())
        .arg("process")
        .assert()
        .success();
    let first = read_note(dir.path(), "2021-01-01");

    slated_cmd()
        .current_dir(dir.path())
        .arg("process")
        .assert()
        .success();
    assert_eq!(read_note(dir.path(), "2021-01-01"), first);
}

#[test]
fn test_process_json_report() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [x] pay rent ; whenever\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["--format", "json", "process", "2020-12-31"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"notices\""))
        .stdout(predicate::str::contains("whenever"));
}

#[test]
fn test_process_skips_undated_notes() {
    let dir = setup_vault();
    write_note(dir.path(), "Inbox", "- [x] a ; every day\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["process", "Inbox"])
        .assert()
        .success();
    assert_eq!(read_note(dir.path(), "Inbox"), "- [x] a ; every day\n");
}

#[test]
fn test_vault_flag() {
    let dir = setup_vault();
    let elsewhere = TempDir::new().unwrap();
    write_note(dir.path(), "2020-12-31", "- [ ] standup ; every day ^task-abcd\n");

    slated_cmd()
        .current_dir(elsewhere.path())
        .arg("--vault")
        .arg(dir.path())
        .args(["process", "2020-12-31"])
        .assert()
        .success();
    assert!(dir.path().join("2021-01-01.md").exists());
}

// =============================================================================
// Task Listing Tests
// =============================================================================

#[test]
fn test_tasks_lists_lines() {
    let dir = setup_vault();
    write_note(
        dir.path(),
        "2020-12-31",
        "# Day\n- [ ] one\n- [x] two ; every week on Monday ^task-abcd\n",
    );

    slated_cmd()
        .current_dir(dir.path())
        .args(["tasks", "2020-12-31"])
        .assert()
        .success()
        .stdout(predicate::str::contains("one"))
        .stdout(predicate::str::contains("every week on Monday (next 2021-01-04)"));
}

#[test]
fn test_tasks_json() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [>] moved >[[2021-01-01]] ^task-abcd\n");

    let output = slated_cmd()
        .current_dir(dir.path())
        .args(["-f", "json", "tasks", "2020-12-31.md"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let tasks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(tasks[0]["line"], 1);
    assert_eq!(tasks[0]["state"], "moved_out");
    assert_eq!(tasks[0]["moved_to"], "2021-01-01");
    assert_eq!(tasks[0]["anchor"], "task-abcd");
}

#[test]
fn test_unknown_note_fails() {
    let dir = setup_vault();

    slated_cmd()
        .current_dir(dir.path())
        .args(["tasks", "1999-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Note not found"));
}

// =============================================================================
// Move Tests
// =============================================================================

#[test]
fn test_move_task() {
    let dir = setup_vault();
    write_note(
        dir.path(),
        "2020-12-31",
        "## Tasks\n\n- [ ] a test task ^task-abcd\n  - a detail\n",
    );

    slated_cmd()
        .current_dir(dir.path())
        .args(["move", "2020-12-31", "3", "--to", "2021-01-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved 'a test task' to 2021-01-01"));

    assert_eq!(
        read_note(dir.path(), "2020-12-31"),
        "## Tasks\n\n- [>] a test task >[[2021-01-01]] ^task-abcd\n"
    );
    assert_eq!(
        read_note(dir.path(), "2021-01-01"),
        "## Tasks\n\n- [ ] a test task [[2020-12-31#^task-abcd|< Origin]]\n  - a detail\n"
    );
}

#[test]
fn test_move_back_restores_origin() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "## Tasks\n\n- [ ] a test task ^task-abcd\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["move", "2020-12-31", "3", "--to", "2021-01-01"])
        .assert()
        .success();
    slated_cmd()
        .current_dir(dir.path())
        .args(["move", "2021-01-01", "3", "--to", "2020-12-31"])
        .assert()
        .success();

    assert_eq!(
        read_note(dir.path(), "2020-12-31"),
        "## Tasks\n\n- [ ] a test task ^task-abcd\n"
    );
    assert_eq!(read_note(dir.path(), "2021-01-01"), "## Tasks\n\n");
}

#[test]
fn test_move_rejects_non_task_line() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "## Tasks\n\n- [ ] a test task\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["move", "2020-12-31", "1", "--to", "2021-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Line 1 is not a task"));
}

#[test]
fn test_move_rejects_bad_date() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [ ] a test task\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["move", "2020-12-31", "1", "--to", "someday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid date"));
}

#[test]
fn test_move_incomplete() {
    let dir = setup_vault();
    write_note(
        dir.path(),
        "2020-12-31",
        "## Tasks\n\n- [ ] one ^task-aaaa\n- [x] done\n- [ ] two ^task-bbbb\n",
    );

    slated_cmd()
        .current_dir(dir.path())
        .args(["move-incomplete", "2020-12-31", "--to", "2021-01-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved 2 task(s)"));

    let target = read_note(dir.path(), "2021-01-01");
    assert!(target.contains("- [ ] one [[2020-12-31#^task-aaaa|< Origin]]"));
    assert!(target.contains("- [ ] two [[2020-12-31#^task-bbbb|< Origin]]"));
}

// =============================================================================
// Recurrence Tests
// =============================================================================

#[test]
fn test_skip_occurrence() {
    let dir = setup_vault();
    write_note(
        dir.path(),
        "2020-12-31",
        "## Tasks\n\n- [ ] water plants ; every 2 days ^task-abcd\n",
    );

    slated_cmd()
        .current_dir(dir.path())
        .args(["skip", "2020-12-31", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("next in 2021-01-02"));

    assert_eq!(
        read_note(dir.path(), "2020-12-31"),
        "## Tasks\n\n- [-] water plants ; every 2 days ^task-abcd\n"
    );
    assert!(read_note(dir.path(), "2021-01-02").contains("[[2020-12-31#^task-abcd|<< Origin]]"));
}

#[test]
fn test_skip_plain_task_is_a_notice() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [ ] plain\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["skip", "2020-12-31", "1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Cannot skip"));
    assert_eq!(read_note(dir.path(), "2020-12-31"), "- [ ] plain\n");
}

#[test]
fn test_repeat_shows_rule() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [ ] review ; every month on the last day\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["repeat", "2020-12-31", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RRULE:FREQ=MONTHLY"))
        .stdout(predicate::str::contains("2021-01-31"));
}

#[test]
fn test_repeat_edits_facets() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [ ] review ; every week on Sunday ^task-abcd\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["repeat", "2020-12-31", "1", "--interval", "2", "--days", "mon,fri"])
        .assert()
        .success();

    assert_eq!(
        read_note(dir.path(), "2020-12-31"),
        "- [ ] review ; every 2 weeks on Monday and Friday ^task-abcd\n"
    );
}

#[test]
fn test_repeat_sets_new_rule() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [ ] review\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["repeat", "2020-12-31", "1", "--every", "every day"])
        .assert()
        .success();

    assert_eq!(read_note(dir.path(), "2020-12-31"), "- [ ] review ; every day\n");
}

#[test]
fn test_repeat_without_recurrence_fails() {
    let dir = setup_vault();
    write_note(dir.path(), "2020-12-31", "- [ ] review\n");

    slated_cmd()
        .current_dir(dir.path())
        .args(["repeat", "2020-12-31", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not repeat"));
}
