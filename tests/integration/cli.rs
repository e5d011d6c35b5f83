#![allow(missing_docs)]

#[path = "support/mod.rs"]
mod support;

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use csv::ReaderBuilder;
use serde_json::{json, Value};
use tempfile::TempDir;

/// A temp dir holding a config that selects the local backend.
fn workspace() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("wasqlite.toml");
    fs::write(&config, "default_backend = \"local\"\n").expect("write config");
    (dir, config)
}

fn seed(path: &Path) {
    let conn = rusqlite::Connection::open(path).expect("open fixture");
    conn.execute_batch(
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO people (name) VALUES ('ada'), ('grace');",
    )
    .expect("seed fixture");
}

#[test]
fn completions_need_no_engine() {
    let output = cargo_bin_cmd!("wasqlite")
        .args(["completions", "bash"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("wasqlite"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("wasqlite")
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .args(["version", "sqlite3.wasm"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("does not exist"));
}

#[test]
fn version_prints_the_library_version() {
    let Some(wasm) = support::engine_wasm() else {
        return;
    };
    let (_dir, config) = workspace();
    let output = cargo_bin_cmd!("wasqlite")
        .arg("--config")
        .arg(&config)
        .arg("version")
        .arg(&wasm)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).trim().starts_with("3."));
}

#[test]
fn exec_emits_json_result_sets() {
    let Some(wasm) = support::engine_wasm() else {
        return;
    };
    let (dir, config) = workspace();
    let db = dir.path().join("people.db");
    seed(&db);

    let output = cargo_bin_cmd!("wasqlite")
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "exec"])
        .arg(&wasm)
        .arg(&db)
        .arg("SELECT id, name FROM people ORDER BY id; SELECT x'0102' AS raw, NULL AS nothing")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let sets: Value = serde_json::from_slice(&output).expect("json output");
    assert_eq!(
        sets,
        json!([
            { "columns": ["id", "name"], "rows": [[1, "ada"], [2, "grace"]] },
            { "columns": ["raw", "nothing"], "rows": [["AQI=", null]] },
        ])
    );
}

#[test]
fn exec_writes_csv_and_persists_changes() {
    let Some(wasm) = support::engine_wasm() else {
        return;
    };
    let (dir, config) = workspace();
    let db = dir.path().join("people.db");
    seed(&db);

    cargo_bin_cmd!("wasqlite")
        .arg("--config")
        .arg(&config)
        .arg("exec")
        .arg(&wasm)
        .arg(&db)
        .arg("INSERT INTO people (name) VALUES ('linus')")
        .assert()
        .success();

    let output = cargo_bin_cmd!("wasqlite")
        .arg("--config")
        .arg(&config)
        .args(["--format", "csv", "exec"])
        .arg(&wasm)
        .arg(&db)
        .arg("SELECT name FROM people ORDER BY id")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let mut reader = ReaderBuilder::new().from_reader(output.as_slice());
    let names: Vec<String> = reader
        .records()
        .map(|record| record.expect("csv record")[0].to_owned())
        .collect();
    assert_eq!(names, ["ada", "grace", "linus"]);
}

#[test]
fn dump_writes_a_database_image() {
    let Some(wasm) = support::engine_wasm() else {
        return;
    };
    let (dir, config) = workspace();
    let db = dir.path().join("people.db");
    let out = dir.path().join("people.snapshot");
    seed(&db);

    cargo_bin_cmd!("wasqlite")
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "dump"])
        .arg(&wasm)
        .arg(&db)
        .arg(&out)
        .assert()
        .success();

    let image = fs::read(&out).expect("snapshot written");
    assert!(image.starts_with(b"SQLite format 3\0"));
    let copy = rusqlite::Connection::open(&out).expect("open snapshot");
    let count: i64 = copy
        .query_row("SELECT count(*) FROM people", [], |row| row.get(0))
        .expect("count rows");
    assert_eq!(count, 2);
}

#[test]
fn sql_errors_fail_the_command() {
    let Some(wasm) = support::engine_wasm() else {
        return;
    };
    let (dir, config) = workspace();
    let output = cargo_bin_cmd!("wasqlite")
        .arg("--config")
        .arg(&config)
        .arg("exec")
        .arg(&wasm)
        .arg(dir.path().join("empty.db"))
        .arg("SELECT * FROM nowhere")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("nowhere"));
}
