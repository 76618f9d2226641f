//! Integration tests for the semgate binary

mod common;

use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;

use common::test_timeout_guard;

const DEADLINE: Duration = Duration::from_secs(90);

fn semgate() -> Command {
    let mut cmd = Command::cargo_bin("semgate").unwrap();
    cmd.timeout(Duration::from_secs(60));
    cmd
}

#[test]
fn test_help_output() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stress harness"));
}

#[test]
fn test_version_output() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("semgate"));
}

#[test]
fn test_semaphore_scenario() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate()
        .args(["semaphore", "--capacity", "4", "--tasks", "200", "--threads", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("semaphore: 200 operations"))
        .stdout(predicate::str::contains("peak concurrency"));
}

#[test]
fn test_counter_scenario() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate()
        .args(["counter", "--increments", "500", "--threads", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("counter: 500 operations"));
}

#[test]
fn test_numlock_scenario() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate()
        .args(["numlock", "--keys", "3", "--tasks", "60", "--threads", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("numlock: 60 operations"));
}

#[test]
fn test_until_scenario() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate()
        .args(["until", "--capacity", "2", "--rounds", "20", "--threads", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("until: 20 operations"));
}

#[test]
fn test_quiet_mode_prints_nothing() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate()
        .args(["counter", "--increments", "10", "--threads", "1", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_zero_capacity_is_rejected() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate()
        .args(["semaphore", "--capacity", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("capacity must be at least 1"));
}

#[test]
fn test_missing_subcommand() {
    let _timeout = test_timeout_guard(DEADLINE);
    semgate().assert().failure();
}
