//! CLI integration tests for cwall
//!
//! Only commands that stay off the network are exercised here; the remote
//! paths are covered by the library tests with mock collaborators.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

/// Temporary watch directory plus a config file pointing at it
fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let watch_dir = temp_dir.path().join("screens");
    fs::create_dir_all(&watch_dir).unwrap();

    let config_path = temp_dir.path().join("config.toml");
    let config_content = format!(
        r#"
watch_dir = "{}"

[google]
folder_id = "folder123"
token_file = "{}"

[instagram]
user_id = "1789"
access_token = "EAAB"
"#,
        escape_path_for_toml(&watch_dir),
        escape_path_for_toml(&temp_dir.path().join("token.json"))
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

fn cwall() -> Command {
    let mut cmd = Command::cargo_bin("cwall").unwrap();
    cmd.env_remove("CWALL_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    cwall()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("publish_to_google"))
        .stdout(predicate::str::contains("publish_to_ins"))
        .stdout(predicate::str::contains("quota"))
        .stdout(predicate::str::contains("set_token"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_run_accepts_delay_flag() {
    cwall()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--t <SECONDS>"));
}

#[test]
fn test_missing_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    cwall()
        .args(["--config", &missing.to_string_lossy(), "status"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load"));
}

#[test]
fn test_incomplete_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "watch_dir = \"/tmp\"\n[google]\nfolder_id = \"\"\ntoken_file = \"t.json\"\n[instagram]\nuser_id = \"1\"\naccess_token = \"x\"\n",
    )
    .unwrap();

    cwall()
        .args(["--config", &config_path.to_string_lossy(), "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("google.folder_id"));
}

#[test]
fn test_invalid_log_format_is_rejected() {
    let (_temp_dir, config_path) = setup_test_env();

    cwall()
        .args(["--config", &config_path, "--log-format", "xml", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log format"));
}

#[test]
fn test_upload_with_nothing_to_do_succeeds() {
    let (temp_dir, config_path) = setup_test_env();

    cwall()
        .args(["--config", &config_path, "publish_to_google"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed 0 files"));

    assert!(!temp_dir.path().join("screens/discard").exists());
}

#[test]
fn test_upload_without_token_file_is_auth_error() {
    let (temp_dir, config_path) = setup_test_env();
    fs::write(temp_dir.path().join("screens/IMG001.jpg"), b"jpeg").unwrap();

    cwall()
        .args(["--config", &config_path, "publish_to_google"])
        .assert()
        .code(2);

    // Nothing moved before credentials were available
    assert!(temp_dir.path().join("screens/IMG001.jpg").exists());
}

#[test]
fn test_status_counts_latest_states() {
    let (temp_dir, config_path) = setup_test_env();
    let log = [
        r#"{"item":"IMG001","state":"quarantined","file":"discard/IMG001.jpg","at":"2024-03-09T10:00:00Z"}"#,
        r#"{"item":"IMG001","state":"uploaded","remote_id":"abc","file":"IMG001-abc.JPEG","at":"2024-03-09T10:00:01Z"}"#,
        r#"{"item":"IMG002","state":"published","remote_id":"def","file":"cwall_image_archive/2024-03-09/IMG002-def.JPEG","at":"2024-03-09T10:00:02Z"}"#,
    ]
    .join("\n");
    fs::write(temp_dir.path().join("screens/.cwall-state.jsonl"), log).unwrap();

    cwall()
        .args(["--config", &config_path, "status"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"uploaded\s+0\s+1").unwrap())
        .stdout(predicate::str::is_match(r"published\s+0\s+1").unwrap())
        .stdout(predicate::str::is_match(r"quarantined\s+0\s+0").unwrap());

    cwall()
        .args(["--config", &config_path, "status", "--state", "uploaded"])
        .assert()
        .success()
        .stdout(predicate::str::contains("IMG001\tabc\tIMG001-abc.JPEG"))
        .stdout(predicate::str::contains("IMG002").not());
}

#[test]
fn test_status_reads_states_from_disk() {
    let (temp_dir, config_path) = setup_test_env();
    let screens = temp_dir.path().join("screens");
    fs::create_dir_all(screens.join("discard")).unwrap();
    fs::write(screens.join("IMG003.jpg"), b"").unwrap();
    fs::write(screens.join("IMG002-b.JPEG"), b"").unwrap();
    fs::write(screens.join("discard/IMG002.jpg"), b"").unwrap();

    cwall()
        .args(["--config", &config_path, "status"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"raw\s+1\s+0").unwrap())
        .stdout(predicate::str::is_match(r"uploaded\s+1\s+0").unwrap())
        .stdout(predicate::str::is_match(r"quarantined\s+1\s+0").unwrap());
}

#[test]
fn test_set_token_rejects_empty_input() {
    let (temp_dir, config_path) = setup_test_env();
    let before = fs::read_to_string(temp_dir.path().join("config.toml")).unwrap();

    cwall()
        .args(["--config", &config_path, "set_token", "--stdin"])
        .write_stdin("  \n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be empty"));

    let after = fs::read_to_string(temp_dir.path().join("config.toml")).unwrap();
    assert_eq!(before, after);
}
