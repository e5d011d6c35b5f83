//! Host bindings for SQLite compiled to WebAssembly.
//!
//! The engine runs inside a wasmtime sandbox and reaches the outside world
//! only through imports this crate supplies: storage goes through a
//! pluggable [`Vfs`], user-defined SQL functions through [`Function`]
//! closures. On top of that sits the usual open/prepare/step/bind/column
//! surface.
//!
//! ```no_run
//! use wasqlite::{EngineConfig, OpenOptions, Sqlite, Value};
//!
//! let config = EngineConfig::default();
//! let sqlite = Sqlite::from_file("sqlite3.wasm", &config)?;
//! let mut db = sqlite.open(":memory:", OpenOptions::new())?;
//! db.exec("CREATE TABLE t(x); INSERT INTO t VALUES (1), (2)")?;
//! let mut stmt = db.prepare("SELECT sum(x) FROM t")?.expect("statement");
//! let rows: Vec<_> = stmt.query(&[])?.collect::<Result<_, _>>()?;
//! assert_eq!(rows, vec![vec![Value::Integer(3)]]);
//! stmt.finalize()?;
//! db.close()?;
//! # Ok::<(), wasqlite::Error>(())
//! ```

#![warn(missing_docs)]

pub mod db;
pub mod engine;
pub mod func;
pub mod primitives;
pub mod types;
pub mod vfs;

pub use db::{Database, ExecRow, ExecValue, OpenOptions, Rows, Statement};
pub use engine::{BackendKind, EngineConfig, EngineModule, OptLevel, Sqlite};
pub use func::{Function, FunctionBuilder, FunctionKind};
pub use types::{
    to_scalar, Datatype, Error, ExtendedValue, OpenFlags, Result, SqliteError, Value,
};
pub use vfs::{LocalVfs, MemoryOnlyVfs, Vfs, VfsFile};

#[cfg(feature = "remote")]
pub use vfs::{HttpRangeSource, RangeSource, RemoteVfs};
