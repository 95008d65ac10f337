//! CLI subprocess integration tests.
//!
//! These tests invoke the `dbsnap` binary as a subprocess and verify
//! exit codes, stdout content, and JSON output stability.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn dbsnap_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dbsnap"));
    // The mock backend and the stand-in migrator need no external tools.
    cmd.env("DBSNAP_SKIP_PREREQS", "1");
    cmd.env_remove("DBSNAP_LOG");
    cmd
}

fn write_project(dir: &Path, snapshot_name: &str, backend: &str, migrator: &str) -> PathBuf {
    let path = dir.join("dbsnap.toml");
    std::fs::write(
        &path,
        format!(
            r#"[snapshot]
name = "{snapshot_name}"
base_image = "pg:15"

[runtime]
backend = "{backend}"
flyway_command = "{migrator}"
"#
        ),
    )
    .unwrap();
    path
}

fn write_migrations(dir: &Path) {
    let migrations = dir.join("db/migration");
    std::fs::create_dir_all(&migrations).unwrap();
    std::fs::write(
        migrations.join("V1__init.sql"),
        "CREATE TABLE users (id bigint);\n",
    )
    .unwrap();
    std::fs::write(
        migrations.join("V1_1__add_col.sql"),
        "ALTER TABLE users ADD COLUMN name text;\n",
    )
    .unwrap();
}

fn mock_project(migrator: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(dir.path());
    let config = write_project(dir.path(), "myapp", "mock", migrator);
    (dir, config)
}

fn run(config: &Path, args: &[&str]) -> Output {
    dbsnap_bin()
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({e}): {stdout}"))
}

#[test]
fn cli_version_exits_zero() {
    let output = dbsnap_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "dbsnap --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("dbsnap"),
        "version output must contain 'dbsnap': {stdout}"
    );
}

#[test]
fn cli_help_lists_commands() {
    let output = dbsnap_bin().arg("--help").output().unwrap();
    assert!(output.status.success(), "dbsnap --help must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["provision", "fingerprint", "inspect", "prune", "doctor"] {
        assert!(stdout.contains(command), "help must list '{command}'");
    }
}

#[test]
fn cli_fingerprint_prints_tag() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["fingerprint"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "V1_1-7ff019");
}

#[test]
fn cli_fingerprint_json() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["--json", "fingerprint"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["name"], "myapp");
    assert_eq!(json["tag"], "V1_1-7ff019");
    assert_eq!(json["reference"], "myapp:V1_1-7ff019");
}

#[test]
fn cli_provision_builds_on_mock() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["--json", "provision"]);
    assert!(
        output.status.success(),
        "provision failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json = stdout_json(&output);
    assert_eq!(json["outcome"], "built");
    assert_eq!(json["snapshot"]["tag"], "V1_1-7ff019");
    assert_eq!(json["connection"]["address"], "myapp:V1_1-7ff019");
    assert_eq!(json["connection"]["database"], "database");
    assert_eq!(json["connection"]["user"], "user");
}

#[test]
fn cli_provision_text_output() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["provision"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("myapp:V1_1-7ff019"), "{stdout}");
    assert!(stdout.contains("built"), "{stdout}");
}

#[test]
fn cli_provision_migration_failure_exits_one() {
    let (_dir, config) = mock_project("false");
    let output = run(&config, &["provision"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("migrations from"), "{stderr}");
}

#[test]
fn cli_missing_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&dir.path().join("absent.toml"), &["fingerprint"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load"));
}

#[test]
fn cli_invalid_snapshot_name_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(dir.path());
    let config = write_project(dir.path(), "Bad Name", "mock", "true");
    let output = run(&config, &["fingerprint"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_empty_migration_directory_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("db/migration")).unwrap();
    let config = write_project(dir.path(), "myapp", "mock", "true");
    let output = run(&config, &["fingerprint"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("migration set error:"));
}

#[test]
fn cli_unknown_backend_exits_three() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["--backend", "nope", "fingerprint"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("runtime error:"));
}

#[test]
fn cli_inspect_reports_missing_snapshot() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["--json", "inspect"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["snapshot"]["name"], "myapp");
    assert!(json["record"].is_null());

    let text = run(&config, &["inspect"]);
    assert!(text.status.success());
    assert!(String::from_utf8_lossy(&text.stdout).contains("not built"));
}

#[test]
fn cli_prune_dry_run_on_empty_registry() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["--json", "prune", "--dry-run"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["repository"], "myapp");
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["removed"].as_array().unwrap().len(), 0);
}

#[test]
fn cli_doctor_json_lists_project_checks() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["--json", "doctor"]);
    let json = stdout_json(&output);
    assert!(json["healthy"].is_boolean());
    let names: Vec<&str> = json["checks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert!(names.contains(&"project_file"));
    assert!(names.contains(&"migrations"));
    let migrations = json["checks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "migrations")
        .unwrap();
    assert_eq!(migrations["status"], "pass");
    assert!(migrations["message"]
        .as_str()
        .unwrap()
        .contains("myapp:V1_1-7ff019"));
}

#[test]
fn cli_completions_bash() {
    let output = dbsnap_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("dbsnap"));
}

#[test]
fn cli_verbose_logs_engine_wiring() {
    let (_dir, config) = mock_project("true");
    let output = run(&config, &["--verbose", "fingerprint"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("using backend mock"), "{stderr}");
    assert!(stderr.contains("snapshot myapp"), "{stderr}");
}
