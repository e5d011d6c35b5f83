//! Shared fixtures for the engine-backed integration tests.
//!
//! The tests need a compiled `sqlite3.wasm`. Point `WASQLITE_WASM` at one,
//! or place it at `sqlite/sqlite3.wasm`. A missing artifact fails every
//! engine-backed test unless `WASQLITE_SKIP_ENGINE_TESTS=1` is set, in
//! which case they return early with a note on stderr.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};
use wasqlite::{Database, EngineConfig, EngineModule, OpenOptions, Sqlite, Value};

/// Routes library logs through the test harness's captured output.
pub fn init_tracing() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wasqlite=info"));
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

pub fn wasm_path() -> Option<PathBuf> {
    let path = std::env::var_os("WASQLITE_WASM")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("sqlite")
                .join("sqlite3.wasm")
        });
    path.exists().then_some(path)
}

const SKIP_VAR: &str = "WASQLITE_SKIP_ENGINE_TESTS";

/// The engine artifact; `None` only when it is missing and skipping was
/// asked for.
pub fn engine_wasm() -> Option<PathBuf> {
    if let Some(path) = wasm_path() {
        return Some(path);
    }
    if std::env::var_os(SKIP_VAR).is_some_and(|v| v == "1") {
        eprintln!("skipping: no sqlite3.wasm ({SKIP_VAR}=1)");
        return None;
    }
    panic!(
        "no sqlite3.wasm: set WASQLITE_WASM or build sqlite/sqlite3.wasm \
         ({SKIP_VAR}=1 skips engine-backed tests)"
    );
}

/// The engine module, compiled once per test binary.
pub fn module() -> Option<&'static EngineModule> {
    init_tracing();
    static MODULE: OnceLock<Option<EngineModule>> = OnceLock::new();
    MODULE
        .get_or_init(|| {
            let path = engine_wasm()?;
            Some(EngineModule::from_file(&path, &EngineConfig::default()).expect("compile engine"))
        })
        .as_ref()
}

pub fn sqlite_with(config: &EngineConfig) -> Option<Sqlite> {
    let module = module()?;
    Some(Sqlite::instantiate(module, config).expect("instantiate engine"))
}

pub fn sqlite() -> Option<Sqlite> {
    sqlite_with(&EngineConfig::deterministic(7))
}

/// A fresh instance plus an in-memory connection.
pub fn memory_db() -> Option<(Sqlite, Database)> {
    let sqlite = sqlite()?;
    let db = sqlite.open(":memory:", OpenOptions::new()).expect("open :memory:");
    Some((sqlite, db))
}

/// Every row of `sql`, decoded.
pub fn query(db: &Database, sql: &str) -> Vec<Vec<Value>> {
    let mut stmt = db.prepare(sql).expect("prepare").expect("statement");
    let rows = stmt
        .query(&[])
        .expect("query")
        .collect::<wasqlite::Result<Vec<_>>>()
        .expect("rows");
    stmt.finalize().expect("finalize");
    rows
}

/// The single value of a one-row, one-column query.
pub fn scalar(db: &Database, sql: &str) -> Value {
    let mut rows = query(db, sql);
    assert_eq!(rows.len(), 1, "{sql} returned {} rows", rows.len());
    let mut row = rows.remove(0);
    assert_eq!(row.len(), 1, "{sql} returned {} columns", row.len());
    row.remove(0)
}

/// Skips the calling test when the engine module was opted out.
#[macro_export]
macro_rules! require {
    ($fixture:expr) => {
        match $fixture {
            Some(value) => value,
            None => return,
        }
    };
}
