use assert_cmd::Command;
use predicates::prelude::*;

use crate::common::CURRENT_VERSION;

#[test]
fn test_version_prints_bare_version() {
    Command::cargo_bin("toolup")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(format!("{CURRENT_VERSION}\n"));
}

#[test]
fn test_help_hides_replace_helper() {
    Command::cargo_bin("toolup")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upgrade"))
        .stdout(predicate::str::contains("replace-helper").not());
}

#[test]
fn test_verbose_conflicts_with_quiet() {
    Command::cargo_bin("toolup")
        .unwrap()
        .args(["--verbose", "--quiet", "version"])
        .assert()
        .failure();
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("toolup").unwrap().arg("frobnicate").assert().failure();
}
