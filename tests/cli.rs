use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_admin_init_writes_token() {
    let temp = TempDir::new().unwrap();

    Command::cargo_bin("cadastre")
        .unwrap()
        .args(["admin", "init", "--non-interactive", "--data-dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Admin token"));

    let token = std::fs::read_to_string(temp.path().join(".admin_token")).unwrap();
    assert!(token.starts_with("cadastre_"));
    assert!(temp.path().join("cadastre.db").exists());
}

#[test]
fn test_admin_init_twice_fails() {
    let temp = TempDir::new().unwrap();

    Command::cargo_bin("cadastre")
        .unwrap()
        .args(["admin", "init", "--non-interactive", "--data-dir"])
        .arg(temp.path())
        .assert()
        .success();

    Command::cargo_bin("cadastre")
        .unwrap()
        .args(["admin", "init", "--non-interactive", "--data-dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_serve_requires_init() {
    let temp = TempDir::new().unwrap();

    Command::cargo_bin("cadastre")
        .unwrap()
        .args(["serve", "--data-dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}
