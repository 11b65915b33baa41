// ABOUTME: Integration tests for the imgferry CLI commands.
// ABOUTME: Validates --help output, init, and local image commands against a temp store.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn imgferry_cmd(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("imgferry"));
    cmd.current_dir(dir)
        .env_remove("IMGFERRY_CONFIG")
        .env_remove("IMGFERRY_STORE")
        .env_remove("IMGFERRY_PASSWORD");
    cmd
}

#[test]
fn help_shows_commands() {
    let temp_dir = tempfile::tempdir().unwrap();
    imgferry_cmd(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("pull"))
        .stdout(predicate::str::contains("push"))
        .stdout(predicate::str::contains("mirror"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("imgferry.yml");

    imgferry_cmd(temp_dir.path()).arg("init").assert().success();

    assert!(config_path.exists(), "imgferry.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("transfer:"));
    assert!(content.contains("registries:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("imgferry.yml");
    fs::write(&config_path, "transfer: {}\n").unwrap();

    imgferry_cmd(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    imgferry_cmd(temp_dir.path())
        .args(["init", "--force"])
        .assert()
        .success();
    assert!(fs::read_to_string(&config_path).unwrap().contains("retries"));
}

#[test]
fn ls_on_empty_store_succeeds() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = temp_dir.path().join("store");

    imgferry_cmd(temp_dir.path())
        .arg("--store")
        .arg(&store)
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("NAME"));

    assert!(store.join("blobs").is_dir());
}

#[test]
fn json_output_reports_success() {
    let temp_dir = tempfile::tempdir().unwrap();

    imgferry_cmd(temp_dir.path())
        .arg("--store")
        .arg(temp_dir.path().join("store"))
        .args(["--output", "json", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""event":"success""#))
        .stdout(predicate::str::contains("NAME").not());
}

#[test]
fn removing_a_missing_image_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    imgferry_cmd(temp_dir.path())
        .arg("--store")
        .arg(temp_dir.path().join("store"))
        .args(["rm", "registry.example.com/app:v1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn invalid_config_is_reported() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("imgferry.yml"), "transfer:\n  retries: 0\n").unwrap();

    imgferry_cmd(temp_dir.path())
        .arg("--store")
        .arg(temp_dir.path().join("store"))
        .arg("ls")
        .assert()
        .failure()
        .stderr(predicate::str::contains("retries"));
}

#[test]
fn invalid_platform_flag_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();

    imgferry_cmd(temp_dir.path())
        .args(["--platform", "amd64", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("os/arch"));
}
