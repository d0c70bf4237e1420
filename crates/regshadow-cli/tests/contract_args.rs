//! Contract tests for the CLI surface: invocation validation, exit codes,
//! and per-file failure isolation. These run on any platform — a module that
//! cannot be captured is a per-file failure, never a crash.

use assert_cmd::Command;
use predicates::prelude::*;

fn regshadow() -> Command {
    Command::cargo_bin("regshadow").expect("binary builds")
}

#[test]
fn no_input_is_an_invocation_error() {
    regshadow().assert().code(2);
}

#[test]
fn batch_and_dir_conflict() {
    regshadow()
        .args(["--batch", "list.txt", "--dir", "components"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn name_conflicts_with_directory_mode() {
    regshadow()
        .args(["--dir", "components", "--name", "custom"])
        .assert()
        .failure();
}

#[test]
fn malformed_version_is_an_invocation_error() {
    regshadow()
        .args(["--assembly-version", "1.2", "widgets.dll"])
        .assert()
        .code(2);
}

#[test]
fn missing_module_fails_without_crashing() {
    let dir = tempfile::tempdir().expect("temp dir");
    regshadow()
        .current_dir(dir.path())
        .arg("no-such-module.dll")
        .assert()
        .code(1);
}

#[test]
fn batch_run_continues_past_bad_lines_and_writes_the_client_manifest() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(
        dir.path().join("list.txt"),
        "missing-one.dll\nmissing-two.dll|two|1.0.0.0\n\n",
    )
    .expect("write batch file");

    regshadow()
        .current_dir(dir.path())
        .args(["--batch", "list.txt", "--client", "viewer.exe"])
        .assert()
        .code(1);

    // Both lines failed, so the aggregate declares no dependencies, but the
    // client manifest is still produced.
    let client = std::fs::read_to_string(dir.path().join("viewer.exe.manifest"))
        .expect("client manifest exists");
    assert!(client.contains("<assembly"));
    assert!(!client.contains("<dependency>"));
}

#[test]
fn help_documents_the_registration_flags() {
    regshadow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--sha256"))
        .stdout(predicate::str::contains("--batch"))
        .stdout(predicate::str::contains("--client"));
}
