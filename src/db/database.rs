use serde::Serialize;
use tracing::{debug, trace, warn};
use wasmtime::{Linker, Module, Store};

use super::statement::Statement;
use crate::engine::{EngineExports, ExecSink, HostState, Sqlite};
use crate::func::Function;
use crate::primitives::memory::{ptr, PTR_SIZE};
use crate::types::{
    constants::{codes, deserialize, serialize},
    Error, Result, SqliteError,
};

/// One column of a row reported by [`Database::exec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecValue {
    /// Column name.
    pub name: String,
    /// Column text; `None` for SQL NULL.
    pub value: Option<String>,
}

/// A row reported by [`Database::exec`].
pub type ExecRow = Vec<ExecValue>;

/// An open connection.
///
/// Close it with [`Database::close`]; dropping an open connection closes it
/// on a best-effort basis and only logs failures.
#[derive(Debug)]
pub struct Database {
    sqlite: Sqlite,
    handle: u32,
    serial: u64,
    open: bool,
}

impl Database {
    pub(crate) fn new(sqlite: Sqlite, handle: u32, serial: u64) -> Self {
        Self {
            sqlite,
            handle,
            serial,
            open: true,
        }
    }

    /// The engine instance this connection lives in.
    pub fn sqlite(&self) -> &Sqlite {
        &self.sqlite
    }

    /// Raw `sqlite3*` address.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// False once [`Database::close`] has succeeded.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Runs `f` against this connection after validating it is still live.
    fn with_conn<R>(
        &self,
        f: impl FnOnce(&mut Store<HostState>, &EngineExports, i32) -> Result<R>,
    ) -> Result<R> {
        if !self.open {
            return Err(Error::misuse("database connection is closed"));
        }
        self.sqlite.with_store(|store, exports| {
            store.data_mut().connection(self.handle, self.serial)?;
            f(store, exports, self.handle as i32)
        })
    }

    /// Compiles the first statement in `sql`.
    ///
    /// Returns `None` when `sql` holds no statement (only whitespace or
    /// comments). The statement remembers the text it consumed and the
    /// residual SQL after it.
    pub fn prepare(&self, sql: &str) -> Result<Option<Statement>> {
        let prepared = self.with_conn(|store, exports, db| {
            let (rc, stmt, consumed) = exports.bridge.scoped(&mut *store, |store, scratch| {
                let z_sql = scratch.c_string(&mut *store, sql)?;
                let pp_stmt = scratch.calloc(&mut *store, PTR_SIZE)?;
                let pz_tail = scratch.calloc(&mut *store, PTR_SIZE)?;
                let rc = exports.prepare_v2.call(
                    &mut *store,
                    (db, z_sql as i32, -1, pp_stmt as i32, pz_tail as i32),
                )?;
                let stmt = exports.bridge.read_u32(&*store, pp_stmt)?;
                let tail = exports.bridge.read_u32(&*store, pz_tail)?;
                let consumed = match tail.checked_sub(z_sql) {
                    Some(offset) if tail != 0 => (offset as usize).min(sql.len()),
                    _ => sql.len(),
                };
                Ok((rc, stmt, consumed))
            })?;
            if rc != codes::OK {
                let err = exports.last_error(&mut *store, self.handle)?;
                if stmt != 0 {
                    exports.finalize.call(&mut *store, (stmt as i32,))?;
                }
                return Err(err.unwrap_or_else(|| SqliteError::new(rc)).into());
            }
            if stmt == 0 {
                return Ok(None);
            }
            let serial = store
                .data_mut()
                .track_statement(self.handle, self.serial, stmt)?;
            Ok(Some((stmt, serial, consumed)))
        })?;

        let Some((stmt, serial, consumed)) = prepared else {
            trace!(db = self.handle, "db.prepare: empty statement");
            return Ok(None);
        };
        let (head, rest) = match sql.is_char_boundary(consumed) {
            true => sql.split_at(consumed),
            false => (sql, ""),
        };
        trace!(db = self.handle, stmt, sql = head, "db.prepare");
        Ok(Some(Statement::new(
            self.sqlite.clone(),
            self.handle,
            self.serial,
            stmt,
            serial,
            head.to_owned(),
            Some(rest.to_owned()),
        )))
    }

    /// Runs every statement in `sql`, collecting the rows they produce as
    /// text.
    pub fn exec(&self, sql: &str) -> Result<Vec<ExecRow>> {
        match self.run_exec(sql, ExecSink::Collect(Vec::new()))? {
            ExecSink::Collect(rows) => Ok(rows),
            ExecSink::Callback(_) => Err(Error::abi("exec sink changed shape")),
        }
    }

    /// Runs every statement in `sql`, handing each row to `callback`.
    ///
    /// Returning `false` from the callback stops execution; the call then
    /// fails with ABORT. The callback runs inside the engine, so it must
    /// not call back into this instance.
    pub fn exec_with<F>(&self, sql: &str, callback: F) -> Result<()>
    where
        F: FnMut(&[ExecValue]) -> bool + Send + 'static,
    {
        self.run_exec(sql, ExecSink::Callback(Box::new(callback)))
            .map(drop)
    }

    fn run_exec(&self, sql: &str, sink: ExecSink) -> Result<ExecSink> {
        self.with_conn(|store, exports, db| {
            let id = store.data_mut().exec_sinks.insert(sink);
            let rc = exports.bridge.scoped(&mut *store, |store, scratch| {
                let z_sql = scratch.c_string(&mut *store, sql)?;
                Ok(exports.exec.call(&mut *store, (db, z_sql as i32, id as i32, 0))?)
            });
            let sink = store.data_mut().exec_sinks.must_remove(id)?;
            let rc = rc?;
            debug!(db, rc, "db.exec");
            exports.check(&mut *store, rc, Some(self.handle))?;
            Ok(sink)
        })
    }

    /// Snapshot of the `main` schema.
    pub fn serialize(&self) -> Result<Option<Vec<u8>>> {
        self.serialize_schema("main", 0)
    }

    /// Snapshot of `schema` in the engine's file format.
    ///
    /// `None` when the engine cannot produce one, e.g. for an empty
    /// temporary schema.
    pub fn serialize_schema(&self, schema: &str, flags: i32) -> Result<Option<Vec<u8>>> {
        self.with_conn(|store, exports, db| {
            exports.bridge.scoped(&mut *store, |store, scratch| {
                let z_schema = scratch.c_string(&mut *store, schema)?;
                let pi_size = scratch.calloc(&mut *store, 8)?;
                let p_out = exports
                    .serialize
                    .call(&mut *store, (db, z_schema as i32, pi_size as i32, flags))?;
                if p_out == 0 {
                    return Ok(None);
                }
                let size = exports.bridge.read_i64(&*store, pi_size)?;
                let data = usize::try_from(size)
                    .map_err(|_| Error::abi(format!("serialized size {size}")))
                    .and_then(|len| exports.bridge.slice_bytes(&*store, ptr(p_out), len));
                if flags & serialize::NOCOPY == 0 {
                    exports.bridge.free(&mut *store, ptr(p_out))?;
                }
                data.map(Some)
            })
        })
    }

    /// Replaces the `main` schema with a snapshot.
    pub fn deserialize(&self, data: &[u8]) -> Result<()> {
        self.deserialize_schema(data, "main")
    }

    /// Replaces `schema` with a snapshot. The engine takes ownership of its
    /// copy and may grow it.
    pub fn deserialize_schema(&self, data: &[u8], schema: &str) -> Result<()> {
        self.deserialize_with(data, schema, 0)
    }

    /// Like [`Database::deserialize_schema`] with extra
    /// [`deserialize`](crate::types::constants::deserialize) flags, e.g.
    /// `READONLY`. `FREEONCLOSE` and `RESIZEABLE` are always set.
    pub fn deserialize_with(&self, data: &[u8], schema: &str, flags: i32) -> Result<()> {
        let len = i64::try_from(data.len()).map_err(|_| Error::code_only(codes::TOOBIG))?;
        self.with_conn(|store, exports, db| {
            let rc = exports.bridge.scoped(&mut *store, |store, scratch| {
                let z_schema = scratch.c_string(&mut *store, schema)?;
                let p_data = scratch.bytes(&mut *store, data)?;
                // Freed by the engine on close, and on failure.
                scratch.forget(p_data);
                Ok(exports.deserialize.call(
                    &mut *store,
                    (
                        db,
                        z_schema as i32,
                        p_data as i32,
                        len,
                        len,
                        flags | deserialize::FREEONCLOSE | deserialize::RESIZEABLE,
                    ),
                )?)
            })?;
            debug!(db, bytes = data.len(), schema, flags, rc, "db.deserialize");
            exports.check(&mut *store, rc, Some(self.handle))
        })
    }

    /// Copies `source`'s `main` schema into `schema` of this connection.
    pub(crate) fn backup_from(&self, source: &Database, schema: &str) -> Result<()> {
        if !source.open {
            return Err(Error::misuse("backup source is closed"));
        }
        self.with_conn(|store, exports, db| {
            store.data_mut().connection(source.handle, source.serial)?;
            exports.bridge.scoped(&mut *store, |store, scratch| {
                let z_dest = scratch.c_string(&mut *store, schema)?;
                let z_source = scratch.c_string(&mut *store, "main")?;
                let backup = exports.backup_init.call(
                    &mut *store,
                    (db, z_dest as i32, source.handle as i32, z_source as i32),
                )?;
                if backup != 0 {
                    exports.backup_step.call(&mut *store, (backup, -1))?;
                    exports.backup_finish.call(&mut *store, (backup,))?;
                }
                Ok(())
            })?;
            let rc = exports.errcode.call(&mut *store, (db,))?;
            exports.check(&mut *store, rc, Some(self.handle))
        })
    }

    /// Registers a user-defined function on this connection.
    pub fn create_function(&self, name: &str, function: Function) -> Result<()> {
        let kind = function.kind();
        let n_arg = function.arity();
        let flags = function.flags();
        self.with_conn(|store, exports, db| {
            let id = store.data_mut().functions.insert(function.into_entry(name));
            let rc = exports.bridge.scoped(&mut *store, |store, scratch| {
                let z_name = scratch.c_string(&mut *store, name)?;
                Ok(exports.create_function.call(
                    &mut *store,
                    (db, z_name as i32, n_arg, flags, id as i32, kind.mode()),
                )?)
            });
            let rc = match rc {
                Ok(rc) if rc == codes::OK => rc,
                other => {
                    // Failed registrations may already have been destroyed.
                    store.data_mut().functions.remove(id);
                    let rc = other?;
                    return exports.check(&mut *store, rc, Some(self.handle));
                }
            };
            store
                .data_mut()
                .connection(self.handle, self.serial)?
                .functions
                .push(id);
            debug!(db, name, id, ?kind, n_arg, rc, "db.create_function");
            Ok(())
        })
    }

    /// Links a compiled extension against the engine's memory and function
    /// table and runs its init entry point on this connection.
    ///
    /// Without `symbol`, the first export named `sqlite3_<letters>_init`
    /// is used. Compile the module with [`Sqlite::compile_extension`].
    pub fn load_extension(&self, module: &Module, symbol: Option<&str>) -> Result<()> {
        let symbol = match symbol {
            Some(symbol) if module.get_export(symbol).is_some() => symbol.to_owned(),
            Some(symbol) => return Err(Error::Extension(format!("symbol {symbol} not found"))),
            None => module
                .exports()
                .map(|export| export.name())
                .find(|name| is_init_symbol(name))
                .map(str::to_owned)
                .ok_or_else(|| Error::Extension("could not find initialization function".into()))?,
        };
        self.with_conn(|store, exports, db| {
            let mut linker: Linker<HostState> = Linker::new(store.engine());
            linker.define(&mut *store, "env", "memory", exports.bridge.memory())?;
            if let Some(table) = exports.table() {
                linker.define(&mut *store, "env", "__indirect_function_table", table)?;
            }
            let instance = linker.instantiate(&mut *store, module)?;
            let init = instance
                .get_typed_func::<(i32, i32, i32), i32>(&mut *store, &symbol)
                .map_err(|err| Error::Extension(format!("{symbol}: {err}")))?;
            let api = exports.get_api_routines.call(&mut *store, ())?;

            let (rc, message) = exports.bridge.scoped(&mut *store, |store, scratch| {
                let pz_err = scratch.calloc(&mut *store, PTR_SIZE)?;
                let rc = init.call(&mut *store, (db, pz_err as i32, api))?;
                let z_err = exports.bridge.read_u32(&*store, pz_err)?;
                let message = exports.bridge.read_opt_cstring(&*store, z_err)?;
                exports.bridge.free(&mut *store, z_err)?;
                Ok((rc, message))
            })?;
            debug!(db, symbol = %symbol, rc, "db.load_extension");
            if rc != codes::OK {
                let err = match message {
                    Some(message) => SqliteError::with_message(rc, message),
                    None => SqliteError::new(rc),
                };
                return Err(err.into());
            }
            Ok(())
        })
    }

    /// Rows changed by the most recent INSERT, UPDATE, or DELETE.
    pub fn changes(&self) -> Result<u64> {
        self.with_conn(|store, exports, db| {
            let n = exports.changes.call(&mut *store, (db,))?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }

    /// Rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        self.with_conn(|store, exports, db| Ok(exports.last_insert_rowid.call(&mut *store, (db,))?))
    }

    /// Passes through to `sqlite3_interrupt`.
    ///
    /// The instance lock is held for the whole of a running statement, so
    /// this takes effect on the next statement rather than a running one.
    pub fn interrupt(&self) -> Result<()> {
        self.with_conn(|store, exports, db| Ok(exports.interrupt.call(&mut *store, (db,))?))
    }

    /// True outside an explicit transaction.
    pub fn is_autocommit(&self) -> Result<bool> {
        self.with_conn(|store, exports, db| Ok(exports.get_autocommit.call(&mut *store, (db,))? != 0))
    }

    /// Finalizes every live statement, then closes the connection.
    ///
    /// Statements prepared from this connection raise MISUSE afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.with_conn(|store, exports, db| {
            let statements: Vec<u32> = store
                .data_mut()
                .connection(self.handle, self.serial)?
                .statements
                .drain()
                .map(|(stmt, _)| stmt)
                .collect();
            for stmt in &statements {
                exports.finalize.call(&mut *store, (*stmt as i32,))?;
            }
            let rc = exports.close.call(&mut *store, (db,))?;
            exports.check(&mut *store, rc, Some(self.handle))?;

            let state = store.data_mut();
            if let Some(conn) = state.untrack_connection(self.handle) {
                // Aggregates get no destroy notification from the engine.
                for id in conn.functions {
                    state.functions.remove(id);
                }
            }
            debug!(db, finalized = statements.len(), "db.close");
            Ok(())
        })?;
        self.open = false;
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(err) = self.close() {
            warn!(db = self.handle, error = %err, "failed to close dropped connection");
        }
    }
}

/// Matches `sqlite3_<letters>_init`.
fn is_init_symbol(name: &str) -> bool {
    name.strip_prefix("sqlite3_")
        .and_then(|rest| rest.strip_suffix("_init"))
        .is_some_and(|middle| !middle.is_empty() && middle.bytes().all(|b| b.is_ascii_alphabetic()))
}
