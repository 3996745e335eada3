//! Command-line behaviour that needs no database.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use warehouse_mirror::SyncConfig;

fn cli() -> Command {
    Command::cargo_bin("warehouse-mirror").unwrap()
}

#[test]
fn help_lists_commands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn init_writes_a_loadable_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mirror.toml");

    cli()
        .args(["--quiet", "init", "--output"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let config = SyncConfig::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.sync.prefix, "src_");
    assert_eq!(config.tables.len(), 2);
    assert_eq!(config.tables[0].key_columns, vec!["id".to_string()]);
    assert!(config.tables[1].delete_missing);
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mirror.toml");
    std::fs::write(&path, "keep me").unwrap();

    cli()
        .args(["--quiet", "init", "--output"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");

    cli()
        .args(["--quiet", "init", "--force", "--output"])
        .arg(&path)
        .assert()
        .success();
    assert!(std::fs::read_to_string(&path).unwrap().contains("[[tables]]"));
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();

    cli()
        .current_dir(dir.path())
        .args(["--quiet", "--config", "nope.toml", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
