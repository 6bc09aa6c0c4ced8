#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use graphcheck::{
    storage::{CountsKey, GraphBuilder, MemoryStore, PropValue},
    types::LabelId,
};
use serde_json::Value;
use tempfile::TempDir;

fn demo_store() -> MemoryStore {
    let mut b = GraphBuilder::new();
    let user = b.label(0, "User");
    let follows = b.relationship_type(0, "FOLLOWS");
    let name = b.property_key(0, "name");
    let ada = b.node(&[user], &[(name, PropValue::Str("Ada".into()))]);
    let grace = b.node(&[user], &[(name, PropValue::Str("Grace".into()))]);
    let alan = b.node(&[user], &[(name, PropValue::Str("Alan".into()))]);
    b.relationship(ada, grace, follows, &[]);
    b.relationship(grace, alan, follows, &[]);
    b.build()
}

fn write_snapshot(dir: &TempDir, name: &str, store: &MemoryStore) -> PathBuf {
    let path = dir.path().join(format!("{name}.json"));
    store.save(&path).expect("save snapshot");
    path
}

fn corrupted_store() -> MemoryStore {
    let mut store = demo_store();
    store.set_count(CountsKey::nodes(Some(LabelId(0))), 5);
    store
}

fn graphcheck() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("graphcheck");
    cmd.env_remove("GRAPHCHECK_CONFIG")
        .env_remove("GRAPHCHECK_WORKERS")
        .env_remove("GRAPHCHECK_LOG");
    cmd
}

#[test]
fn consistent_snapshot_exits_zero() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_snapshot(&dir, "demo", &demo_store());
    let output = graphcheck()
        .args(["--format", "json", "check"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["completed"], Value::Bool(true));
    assert_eq!(json["total_violations"], 0);
    assert_eq!(json["nodes_by_label"]["User"], 3);
    assert_eq!(json["relationships_by_type"]["FOLLOWS"], 2);
}

#[test]
fn violations_exit_with_code_two() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_snapshot(&dir, "broken", &corrupted_store());
    let output = graphcheck()
        .args(["--format", "json", "check", "--workers", "2", "--chunk-size", "1"])
        .arg(&path)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["total_violations"], 1);
    assert_eq!(json["violations"][0]["kind"], "counts_mismatch");
}

#[test]
fn skip_flag_disables_a_check_group() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_snapshot(&dir, "broken", &corrupted_store());
    graphcheck()
        .args(["--quiet", "check", "--skip-counts"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn profile_from_config_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_snapshot(&dir, "broken", &corrupted_store());
    let config = dir.path().join("cli.toml");
    fs::write(
        &config,
        r#"
[profiles.fast]
workers = 2
chunk_size = 1
max_memory = 16
skip = ["counts", "indexes"]
"#,
    )
    .expect("write config");

    let output = graphcheck()
        .args(["--format", "json", "check", "--profile", "fast"])
        .arg("--config")
        .arg(&config)
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["window_size"], 1);
    let phases: Vec<&str> = json["phases"]
        .as_array()
        .expect("phases")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(!phases.contains(&"counts"));
    assert!(!phases.contains(&"schema"));
}

#[test]
fn unknown_profile_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_snapshot(&dir, "demo", &demo_store());
    let config = dir.path().join("cli.toml");
    fs::write(&config, "[profiles.fast]\nworkers = 1\n").expect("write config");
    graphcheck()
        .args(["check", "--profile", "slow"])
        .arg("--config")
        .arg(&config)
        .arg(&path)
        .assert()
        .code(1);
}

#[test]
fn missing_snapshot_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    graphcheck()
        .arg("check")
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(1);
}

#[test]
fn tiny_memory_budget_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_snapshot(&dir, "demo", &demo_store());
    graphcheck()
        .args(["check", "--max-memory", "4"])
        .arg(&path)
        .assert()
        .code(1);
}

#[test]
fn text_output_lists_violations() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_snapshot(&dir, "broken", &corrupted_store());
    let output = graphcheck()
        .args(["--theme", "plain", "check"])
        .arg(&path)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("counts_mismatch: 1"));
    assert!(text.contains("stored 5, observed 3"));
}

#[test]
fn inspect_reports_high_ids() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_snapshot(&dir, "demo", &demo_store());
    let output = graphcheck()
        .args(["--format", "json", "inspect"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["high_ids"]["node"], 3);
    assert_eq!(json["high_ids"]["relationship"], 2);
    assert_eq!(json["tokens"]["labels"], 1);
}
