#![allow(missing_docs)]

#[path = "support/mod.rs"]
mod support;

use std::sync::{Arc, Mutex};

use support::{memory_db, query, scalar};
use wasqlite::types::constants::{codes, deserialize};
use wasqlite::types::SQLITE_VERSION_NUMBER;
use wasqlite::{Datatype, EngineConfig, Error, ExecValue, OpenFlags, OpenOptions, Value};

#[test]
fn version_matches_the_compiled_library() {
    let sqlite = require!(support::sqlite());
    let version = sqlite.version().unwrap();
    assert!(version.starts_with("3."), "{version}");
    let (_sqlite, db) = require!(memory_db());
    assert_eq!(
        scalar(&db, "SELECT sqlite_version()"),
        Value::Text(version)
    );
}

#[test]
fn mismatched_version_is_rejected() {
    let module = require!(support::module());
    let config = EngineConfig {
        expected_version: SQLITE_VERSION_NUMBER - 1,
        ..EngineConfig::default()
    };
    let err = wasqlite::Sqlite::instantiate(module, &config).unwrap_err();
    assert!(matches!(err, Error::VersionMismatch { .. }), "{err}");
}

#[test]
fn file_paths_fail_on_the_memory_backend() {
    let sqlite = require!(support::sqlite());
    assert!(sqlite.open("nosuchfile.db", OpenOptions::new()).is_err());
    assert_eq!(sqlite.inspect(|s| s.connection_count()).unwrap(), 0);
}

#[test]
fn step_walks_rows_and_reads_columns() {
    let (_sqlite, db) = require!(memory_db());
    let mut stmt = db
        .prepare("SELECT 1, 1.2, TRUE, 'TEST', x'0102', NULL")
        .unwrap()
        .unwrap();
    assert_eq!(stmt.column_count().unwrap(), 6);
    assert!(stmt.step().unwrap());
    assert_eq!(stmt.column_type(0).unwrap(), Datatype::Integer);
    assert_eq!(stmt.column_type(1).unwrap(), Datatype::Float);
    assert_eq!(stmt.column_type(5).unwrap(), Datatype::Null);
    assert_eq!(stmt.column_name(3).unwrap(), "'TEST'");
    assert_eq!(
        stmt.columns().unwrap(),
        vec![
            Value::Integer(1),
            Value::Float(1.2),
            Value::Integer(1),
            Value::Text("TEST".into()),
            Value::Blob(vec![1, 2]),
            Value::Null,
        ]
    );
    assert_eq!(stmt.column_text(5).unwrap(), "");
    assert!(!stmt.step().unwrap());
    stmt.finalize().unwrap();
}

#[test]
fn randomness_and_time_come_from_the_backend() {
    let (_sqlite, db) = require!(memory_db());
    let row = query(&db, "SELECT random(), random(), datetime()").remove(0);
    assert_ne!(row[0], row[1]);
    let now = row[2].as_str().unwrap();
    assert!(now.starts_with("20"), "{now}");
}

#[test]
fn bound_values_come_back_unchanged() {
    let (_sqlite, db) = require!(memory_db());
    let mut stmt = db.prepare("SELECT ?, ?, ?, ?, ?, ?").unwrap().unwrap();
    assert_eq!(stmt.bind_parameter_count().unwrap(), 6);
    let values = vec![
        Value::Integer(i64::MAX),
        Value::Float(-0.5),
        Value::Text("tëxt\0with nul".into()),
        Value::Blob(vec![0, 255, 7]),
        Value::Blob(Vec::new()),
        Value::Null,
    ];
    let rows: Vec<_> = stmt
        .query(&values)
        .unwrap()
        .collect::<wasqlite::Result<_>>()
        .unwrap();
    assert_eq!(rows, vec![values]);
    stmt.finalize().unwrap();
}

#[test]
fn narrowed_integers_match_when_they_fit() {
    let (_sqlite, db) = require!(memory_db());
    let mut stmt = db.prepare("SELECT ?, ?").unwrap().unwrap();
    stmt.bind_int(1, -42).unwrap();
    stmt.bind_int64(2, 1 << 40).unwrap();
    assert!(stmt.step().unwrap());
    assert_eq!(stmt.column_value_narrow(0).unwrap(), Value::Integer(-42));
    assert_eq!(stmt.column_int(0).unwrap(), -42);
    assert_eq!(stmt.column_value(1).unwrap(), Value::Integer(1 << 40));
    assert_eq!(stmt.column_int64(1).unwrap(), 1 << 40);
    assert_ne!(stmt.column_value_narrow(1).unwrap(), Value::Integer(1 << 40));
    stmt.finalize().unwrap();
}

#[test]
fn narrowed_rows_read_every_column_through_the_32_bit_accessor() {
    let (_sqlite, db) = require!(memory_db());
    let mut stmt = db.prepare("SELECT 7, 'x', NULL, ?").unwrap().unwrap();
    stmt.bind_int64(1, (1 << 40) + 5).unwrap();
    assert!(stmt.step().unwrap());
    let narrow = stmt.columns_narrow().unwrap();
    assert_eq!(narrow[..3], [Value::Integer(7), Value::Text("x".into()), Value::Null]);
    assert_eq!(narrow[3], Value::Integer(5));
    assert_eq!(stmt.columns().unwrap()[3], Value::Integer((1 << 40) + 5));
    stmt.finalize().unwrap();
}

#[test]
fn prepare_splits_off_the_tail() {
    let (_sqlite, db) = require!(memory_db());
    let mut stmt = db
        .prepare("SELECT DATETIME(); SELECT DATETIME(); SELECT DATETIME()")
        .unwrap()
        .unwrap();
    assert_eq!(stmt.sql(), "SELECT DATETIME();");
    assert_eq!(stmt.tail(), Some(" SELECT DATETIME(); SELECT DATETIME()"));
    stmt.finalize().unwrap();

    assert!(db.prepare("  -- only a comment").unwrap().is_none());
}

#[test]
fn prepare_errors_carry_the_engine_message() {
    let (_sqlite, db) = require!(memory_db());
    let err = db.prepare("SELECT * FROM nope").unwrap_err();
    let sqlite_err = err.as_sqlite().expect("structured error");
    assert_eq!(sqlite_err.code(), codes::ERROR);
    assert!(sqlite_err.message().unwrap().contains("nope"));
}

#[test]
fn decltype_is_none_for_untyped_columns() {
    let (_sqlite, db) = require!(memory_db());
    db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, value TEXT, nodecl)")
        .unwrap();
    let mut stmt = db.prepare("SELECT * FROM t").unwrap().unwrap();
    assert_eq!(stmt.column_decltype(0).unwrap().as_deref(), Some("INTEGER"));
    assert_eq!(stmt.column_decltype(1).unwrap().as_deref(), Some("TEXT"));
    assert_eq!(stmt.column_decltype(2).unwrap(), None);
    stmt.finalize().unwrap();
}

#[test]
fn finalized_statements_are_misuse() {
    let (_sqlite, db) = require!(memory_db());
    let mut stmt = db.prepare("SELECT 1").unwrap().unwrap();
    stmt.finalize().unwrap();
    assert_eq!(stmt.step().unwrap_err().code(), Some(codes::MISUSE));
    assert_eq!(stmt.finalize().unwrap_err().code(), Some(codes::MISUSE));
}

#[test]
fn closing_finalizes_outstanding_statements() {
    let (sqlite, mut db) = require!(memory_db());
    let stmt = db.prepare("SELECT 1").unwrap().unwrap();
    db.close().unwrap();
    assert!(!db.is_open());
    assert_eq!(stmt.step().unwrap_err().code(), Some(codes::MISUSE));
    assert_eq!(db.exec("SELECT 1").unwrap_err().code(), Some(codes::MISUSE));
    assert_eq!(db.close().unwrap_err().code(), Some(codes::MISUSE));
    drop(stmt);
    assert_eq!(sqlite.inspect(|s| s.connection_count()).unwrap(), 0);
}

#[test]
fn exec_collects_rows_as_text() {
    let (_sqlite, db) = require!(memory_db());
    db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, value TEXT)").unwrap();
    db.exec("INSERT INTO t (value) VALUES ('a'), (NULL)").unwrap();
    assert_eq!(db.changes().unwrap(), 2);
    assert_eq!(db.last_insert_rowid().unwrap(), 2);
    let rows = db.exec("SELECT id, value FROM t ORDER BY id").unwrap();
    assert_eq!(
        rows[1],
        vec![
            ExecValue {
                name: "id".into(),
                value: Some("2".into())
            },
            ExecValue {
                name: "value".into(),
                value: None
            },
        ]
    );
    assert!(db.exec("SELECT * FROM nope").is_err());
}

#[test]
fn exec_callback_sees_every_row_and_can_abort() {
    let (_sqlite, db) = require!(memory_db());
    db.exec("CREATE TABLE t (v); INSERT INTO t VALUES (1), (2), (3)")
        .unwrap();

    let seen = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&seen);
    db.exec_with("SELECT sqlite_version(); SELECT * FROM t;", move |_| {
        *counter.lock().unwrap() += 1;
        true
    })
    .unwrap();
    assert_eq!(*seen.lock().unwrap(), 4);

    let err = db.exec_with("SELECT * FROM t", |_| false).unwrap_err();
    assert_eq!(err.code(), Some(codes::ABORT));
}

#[test]
fn reentering_from_a_callback_is_refused() {
    let (sqlite, db) = require!(memory_db());
    let inner = sqlite.clone();
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    db.exec_with("SELECT 1", move |_| {
        *slot.lock().unwrap() = Some(inner.version());
        true
    })
    .unwrap();
    let nested = outcome.lock().unwrap().take().unwrap();
    assert!(matches!(nested, Err(Error::Reentrant)));
}

#[test]
fn transactions_toggle_autocommit() {
    let (_sqlite, db) = require!(memory_db());
    assert!(db.is_autocommit().unwrap());
    db.exec("BEGIN").unwrap();
    assert!(!db.is_autocommit().unwrap());
    db.exec("COMMIT").unwrap();
    assert!(db.is_autocommit().unwrap());
    db.interrupt().unwrap();
}

#[test]
fn serialize_then_deserialize_restores_the_snapshot() {
    let (_sqlite, db) = require!(memory_db());
    db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, value TEXT)").unwrap();
    db.exec("INSERT INTO t (value) VALUES ('hello')").unwrap();
    let snapshot = db.serialize().unwrap().expect("snapshot");
    assert_eq!(&snapshot[..16], b"SQLite format 3\0");

    db.exec("INSERT INTO t (value) VALUES ('hello2')").unwrap();
    db.deserialize(&snapshot).unwrap();
    assert_eq!(scalar(&db, "SELECT count(*) FROM t"), Value::Integer(1));
}

#[test]
fn deserialize_flags_reach_the_engine() {
    let (_sqlite, db) = require!(memory_db());
    db.exec("CREATE TABLE t (v); INSERT INTO t VALUES (1), (2)").unwrap();
    let snapshot = db.serialize().unwrap().expect("snapshot");

    db.deserialize_with(&snapshot, "main", deserialize::READONLY)
        .unwrap();
    assert_eq!(scalar(&db, "SELECT count(*) FROM t"), Value::Integer(2));
    let err = db.exec("INSERT INTO t VALUES (3)").unwrap_err();
    assert_eq!(err.as_sqlite().map(|e| e.code()), Some(codes::READONLY));

    db.deserialize_with(&snapshot, "main", 0).unwrap();
    db.exec("INSERT INTO t VALUES (3)").unwrap();
    assert_eq!(scalar(&db, "SELECT count(*) FROM t"), Value::Integer(3));
}

#[test]
fn load_copies_a_snapshot_into_a_fresh_connection() {
    let (sqlite, mut db) = require!(memory_db());
    db.exec("CREATE TABLE t (v); INSERT INTO t VALUES ('x')").unwrap();
    let snapshot = db.serialize().unwrap().unwrap();
    db.close().unwrap();

    let loaded = sqlite.load(&snapshot, None).unwrap();
    assert_eq!(scalar(&loaded, "SELECT count(*) FROM t"), Value::Integer(1));
    assert_eq!(sqlite.inspect(|s| s.connection_count()).unwrap(), 1);
}

#[test]
fn uri_and_explicit_flags_open() {
    let sqlite = require!(support::sqlite());
    let mut shared = sqlite
        .open(
            "file::memory:?cache=shared",
            OpenOptions::new().flags(OpenFlags::READWRITE | OpenFlags::URI),
        )
        .unwrap();
    shared.exec("CREATE TABLE t (v)").unwrap();
    shared.close().unwrap();

    let mut plain = sqlite
        .open(":memory:", OpenOptions::new().read_write())
        .unwrap();
    plain.exec("CREATE TABLE t (v)").unwrap();
    plain.close().unwrap();
}

#[test]
fn shutdown_succeeds_after_connections_close() {
    let (sqlite, mut db) = require!(memory_db());
    db.close().unwrap();
    sqlite.shutdown().unwrap();
}

#[test]
fn reopens_after_shutdown() {
    let (sqlite, mut db) = require!(memory_db());
    db.close().unwrap();
    sqlite.shutdown().unwrap();

    let mut db = sqlite.open(":memory:", OpenOptions::new()).unwrap();
    db.exec("CREATE TABLE t (v); INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(scalar(&db, "SELECT count(*) FROM t"), Value::Integer(1));
    db.close().unwrap();

    sqlite.shutdown().unwrap();
    sqlite.open(":memory:", OpenOptions::new()).unwrap();
    assert_eq!(sqlite.inspect(|s| s.vfs().backend_count()).unwrap(), 1);
}
