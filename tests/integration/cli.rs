use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `anchor` with an isolated, absent configuration file.
fn anchor(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("anchor").unwrap();
    cmd.current_dir(temp.path())
        .env("ANCHOR_CONFIG", temp.path().join("config.toml"))
        .env("ANCHOR_NO_PROGRESS", "1")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_flags() {
    let temp = TempDir::new().unwrap();
    anchor(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--architectures"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--pin-format"));
}

#[test]
fn test_version_subcommand() {
    let temp = TempDir::new().unwrap();
    anchor(&temp)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!("version: {}", env!("CARGO_PKG_VERSION"))))
        .stdout(predicate::str::contains("(commit "));
}

#[test]
fn test_version_flag() {
    let temp = TempDir::new().unwrap();
    anchor(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_pin_format_rejected() {
    let temp = TempDir::new().unwrap();
    anchor(&temp)
        .args(["--pin-format", "exact"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("arch-qualified"));
}

#[test]
fn test_unsupported_architecture_fails_before_docker() {
    let temp = TempDir::new().unwrap();
    anchor(&temp)
        .args(["--architectures", "x86_64", "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unsupported architecture: x86_64"));
}

#[test]
fn test_invalid_config_reported() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("config.toml"), "architectures = 3\n").unwrap();
    anchor(&temp)
        .arg("--dry-run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"));
}
