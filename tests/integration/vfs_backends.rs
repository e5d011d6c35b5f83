#![allow(missing_docs)]

#[path = "support/mod.rs"]
mod support;

use std::path::Path;
use std::sync::Arc;

use support::{query, scalar, sqlite_with};
use tempfile::TempDir;
use wasqlite::types::constants::codes;
use wasqlite::{EngineConfig, LocalVfs, OpenFlags, OpenOptions, Sqlite, Value, Vfs};

fn local_sqlite() -> Option<Sqlite> {
    sqlite_with(&EngineConfig::local())
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn local_backend_persists_rows_across_connections() {
    let sqlite = require!(local_sqlite());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rows.db");

    let mut db = sqlite.open(path_str(&path), OpenOptions::new()).unwrap();
    assert!(path.exists());
    db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, value TEXT)").unwrap();
    db.exec("INSERT INTO t (value) VALUES ('a'), ('b'), ('c')").unwrap();
    assert_eq!(scalar(&db, "SELECT count(*) FROM t"), Value::Integer(3));
    db.close().unwrap();

    let mut db = sqlite.open(path_str(&path), OpenOptions::new()).unwrap();
    db.exec("BEGIN").unwrap();
    let mut insert = db
        .prepare("INSERT INTO t (value) VALUES (?)")
        .unwrap()
        .unwrap();
    for i in 0..1000 {
        insert
            .query(&[Value::Text(format!("row {i}"))])
            .unwrap()
            .collect::<wasqlite::Result<Vec<_>>>()
            .unwrap();
    }
    insert.finalize().unwrap();
    db.exec("COMMIT").unwrap();
    assert_eq!(scalar(&db, "SELECT count(*) FROM t"), Value::Integer(1003));

    let grown = std::fs::metadata(&path).unwrap().len();
    db.exec("DELETE FROM t WHERE id > 1").unwrap();
    db.exec("VACUUM").unwrap();
    assert_eq!(scalar(&db, "SELECT count(*) FROM t"), Value::Integer(1));
    db.close().unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() < grown);
    assert!(sqlite.write_counter().unwrap() > 0);
    assert!(sqlite.read_counter().unwrap() > 0);
}

#[test]
fn missing_files_without_create_fail_cleanly() {
    let sqlite = require!(local_sqlite());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.db");
    assert!(sqlite
        .open(path_str(&path), OpenOptions::new().read_write())
        .is_err());
    assert!(!path.exists());
    assert_eq!(sqlite.inspect(|s| s.vfs().open_files()).unwrap(), 0);
}

#[test]
fn reads_files_written_by_native_sqlite() {
    let sqlite = require!(local_sqlite());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("native.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE kv (k TEXT PRIMARY KEY, v BLOB);
             INSERT INTO kv VALUES ('one', x'01'), ('two', x'0202');",
        )
        .unwrap();
    }

    let db = sqlite
        .open(path_str(&path), OpenOptions::new().read_only())
        .unwrap();
    assert_eq!(
        query(&db, "SELECT k, v FROM kv ORDER BY k"),
        vec![
            vec![Value::Text("one".into()), Value::Blob(vec![1])],
            vec![Value::Text("two".into()), Value::Blob(vec![2, 2])],
        ]
    );
    assert!(db.exec("INSERT INTO kv VALUES ('three', NULL)").is_err());
}

#[test]
fn rooted_backend_registers_under_its_own_name() {
    let sqlite = require!(local_sqlite());
    let dir = TempDir::new().unwrap();

    let duplicate: Arc<dyn Vfs> = Arc::new(LocalVfs::rooted(dir.path()));
    let err = sqlite.register_vfs(duplicate, false).unwrap_err();
    assert_eq!(err.code(), Some(codes::MISUSE));

    let scratch: Arc<dyn Vfs> = Arc::new(LocalVfs::rooted(dir.path()).with_name("scratch"));
    sqlite.register_vfs(Arc::clone(&scratch), false).unwrap();
    let mut db = sqlite
        .open("rooted.db", OpenOptions::new().vfs("scratch"))
        .unwrap();
    db.exec("CREATE TABLE t (v)").unwrap();
    db.close().unwrap();
    assert!(dir.path().join("rooted.db").exists());

    sqlite.unregister_vfs(&scratch).unwrap();
    assert_eq!(
        sqlite.unregister_vfs(&scratch).unwrap_err().code(),
        Some(codes::MISUSE)
    );
    assert!(sqlite
        .open("rooted.db", OpenOptions::new().vfs("scratch"))
        .is_err());
}

#[test]
fn memory_backend_keeps_the_default_when_local_is_added() {
    let sqlite = require!(support::sqlite());
    let dir = TempDir::new().unwrap();
    let local: Arc<dyn Vfs> = Arc::new(LocalVfs::rooted(dir.path()));
    sqlite.register_vfs(Arc::clone(&local), false).unwrap();

    assert!(sqlite.open("default.db", OpenOptions::new()).is_err());
    let mut db = sqlite
        .open("named.db", OpenOptions::new().vfs(LocalVfs::NAME))
        .unwrap();
    db.close().unwrap();
    assert!(dir.path().join("named.db").exists());
}

#[cfg(feature = "remote")]
mod remote {
    use super::*;
    use axum::Router;
    use tower_http::services::ServeDir;
    use wasqlite::RemoteVfs;

    /// Serves `dir` over HTTP on an ephemeral port until the runtime drops.
    fn serve(dir: &Path) -> (tokio::runtime::Runtime, String) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback_service(ServeDir::new(dir));
        runtime.spawn(async move { axum::serve(listener, app).await });
        (runtime, format!("http://{addr}"))
    }

    #[test]
    fn remote_backend_reads_over_range_requests() {
        let sqlite = require!(support::sqlite());
        let dir = TempDir::new().unwrap();
        {
            let conn = rusqlite::Connection::open(dir.path().join("remote.db")).unwrap();
            conn.execute_batch(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, body TEXT);
                 WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 500)
                 INSERT INTO t (body) SELECT printf('row-%04d', i) FROM n;",
            )
            .unwrap();
        }
        let (_runtime, base) = serve(dir.path());

        let vfs: Arc<dyn Vfs> = Arc::new(RemoteVfs::http(base));
        sqlite.register_vfs(vfs, false).unwrap();
        let flags = OpenFlags::READONLY | OpenFlags::URI;
        let db = sqlite
            .open(
                "remote.db",
                OpenOptions::new().flags(flags).vfs(RemoteVfs::NAME),
            )
            .unwrap();
        assert_eq!(scalar(&db, "SELECT count(*) FROM t"), Value::Integer(500));
        assert_eq!(
            scalar(&db, "SELECT body FROM t WHERE id = 250"),
            Value::Text("row-0250".into())
        );
        assert!(db.exec("DELETE FROM t").is_err());

        // Opening is lazy; the first read finds nothing to fetch.
        let missing = sqlite
            .open("missing.db", OpenOptions::new().flags(flags).vfs(RemoteVfs::NAME))
            .unwrap();
        assert!(missing.exec("SELECT * FROM sqlite_master").is_err());
    }
}
