use tracing::{trace, warn};
use wasmtime::Store;

use super::engine_index;
use crate::engine::{EngineExports, HostState, Sqlite};
use crate::primitives::memory::ptr;
use crate::types::{
    constants::{codes, destructor},
    Datatype, Error, Result, SqliteError, Value,
};

/// A prepared statement.
///
/// Column indices are zero-based, parameter indices one-based, as in the
/// engine. Every call validates the handle first: after
/// [`Statement::finalize`], or after its connection closed, calls raise
/// MISUSE.
#[derive(Debug)]
pub struct Statement {
    sqlite: Sqlite,
    db: u32,
    db_serial: u64,
    handle: u32,
    serial: u64,
    live: bool,
    sql: String,
    tail: Option<String>,
}

impl Statement {
    pub(crate) fn new(
        sqlite: Sqlite,
        db: u32,
        db_serial: u64,
        handle: u32,
        serial: u64,
        sql: String,
        tail: Option<String>,
    ) -> Self {
        Self {
            sqlite,
            db,
            db_serial,
            handle,
            serial,
            live: true,
            sql,
            tail,
        }
    }

    fn with_stmt<R>(
        &self,
        f: impl FnOnce(&mut Store<HostState>, &EngineExports, i32) -> Result<R>,
    ) -> Result<R> {
        if !self.live {
            return Err(Error::misuse("statement is finalized"));
        }
        self.sqlite.with_store(|store, exports| {
            store
                .data_mut()
                .statement(self.db, self.db_serial, self.handle, self.serial)?;
            f(store, exports, self.handle as i32)
        })
    }

    /// The SQL text this statement was compiled from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// SQL left over after the first statement.
    pub fn tail(&self) -> Option<&str> {
        self.tail.as_deref()
    }

    /// Raw `sqlite3_stmt*` address.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Number of result columns.
    pub fn column_count(&self) -> Result<usize> {
        self.with_stmt(|store, exports, stmt| {
            Ok(exports.column_count.call(&mut *store, (stmt,))?.max(0) as usize)
        })
    }

    /// Index of the largest parameter.
    pub fn bind_parameter_count(&self) -> Result<usize> {
        self.with_stmt(|store, exports, stmt| {
            Ok(exports.bind_parameter_count.call(&mut *store, (stmt,))?.max(0) as usize)
        })
    }

    fn bind_with(
        &self,
        index: usize,
        f: impl FnOnce(&mut Store<HostState>, &EngineExports, i32, i32) -> Result<i32>,
    ) -> Result<()> {
        let index = engine_index(index)?;
        let db = self.db;
        self.with_stmt(|store, exports, stmt| {
            let rc = f(&mut *store, exports, stmt, index)?;
            exports.check(&mut *store, rc, Some(db))
        })
    }

    /// Binds text. The engine keeps its own copy.
    pub fn bind_text(&self, index: usize, text: &str) -> Result<()> {
        let len = byte_len(text.len())?;
        self.bind_with(index, |store, exports, stmt, index| {
            exports.bridge.scoped(&mut *store, |store, scratch| {
                let z_text = scratch.c_string(&mut *store, text)?;
                Ok(exports.bind_text.call(
                    &mut *store,
                    (stmt, index, z_text as i32, len, destructor::TRANSIENT),
                )?)
            })
        })
    }

    /// Binds a blob. The engine keeps its own copy.
    pub fn bind_blob(&self, index: usize, data: &[u8]) -> Result<()> {
        let len = byte_len(data.len())?;
        self.bind_with(index, |store, exports, stmt, index| {
            exports.bridge.scoped(&mut *store, |store, scratch| {
                let p_data = scratch.bytes(&mut *store, data)?;
                Ok(exports.bind_blob.call(
                    &mut *store,
                    (stmt, index, p_data as i32, len, destructor::TRANSIENT),
                )?)
            })
        })
    }

    /// Binds a double.
    pub fn bind_double(&self, index: usize, value: f64) -> Result<()> {
        self.bind_with(index, |store, exports, stmt, index| {
            Ok(exports.bind_double.call(&mut *store, (stmt, index, value))?)
        })
    }

    /// Binds a 32-bit integer.
    pub fn bind_int(&self, index: usize, value: i32) -> Result<()> {
        self.bind_with(index, |store, exports, stmt, index| {
            Ok(exports.bind_int.call(&mut *store, (stmt, index, value))?)
        })
    }

    /// Binds a 64-bit integer.
    pub fn bind_int64(&self, index: usize, value: i64) -> Result<()> {
        self.bind_with(index, |store, exports, stmt, index| {
            Ok(exports.bind_int64.call(&mut *store, (stmt, index, value))?)
        })
    }

    /// Binds NULL.
    pub fn bind_null(&self, index: usize) -> Result<()> {
        self.bind_with(index, |store, exports, stmt, index| {
            Ok(exports.bind_null.call(&mut *store, (stmt, index))?)
        })
    }

    /// Binds a dynamic value with the setter matching its variant.
    pub fn bind_value(&self, index: usize, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.bind_null(index),
            Value::Integer(v) => self.bind_int64(index, *v),
            Value::Float(v) => self.bind_double(index, *v),
            Value::Text(v) => self.bind_text(index, v),
            Value::Blob(v) => self.bind_blob(index, v),
        }
    }

    /// Binds `values` to parameters 1..=n.
    pub fn bind_values(&self, values: &[Value]) -> Result<()> {
        for (i, value) in values.iter().enumerate() {
            self.bind_value(i + 1, value)?;
        }
        Ok(())
    }

    /// Resets every parameter to NULL.
    pub fn clear_bindings(&self) -> Result<()> {
        let db = self.db;
        self.with_stmt(|store, exports, stmt| {
            let rc = exports.clear_bindings.call(&mut *store, (stmt,))?;
            exports.check(&mut *store, rc, Some(db))
        })
    }

    /// Advances to the next row. `Ok(false)` once the statement is done.
    pub fn step(&self) -> Result<bool> {
        let db = self.db;
        self.with_stmt(|store, exports, stmt| {
            match exports.step.call(&mut *store, (stmt,))? {
                codes::ROW => Ok(true),
                codes::OK | codes::DONE => Ok(false),
                rc => {
                    let err = exports.last_error(&mut *store, db)?;
                    Err(err.unwrap_or_else(|| SqliteError::new(rc)).into())
                }
            }
        })
    }

    /// Rewinds the statement; bindings are kept.
    pub fn reset(&self) -> Result<()> {
        let db = self.db;
        self.with_stmt(|store, exports, stmt| {
            let rc = exports.reset.call(&mut *store, (stmt,))?;
            exports.check(&mut *store, rc, Some(db))
        })
    }

    /// Storage class of a column in the current row.
    pub fn column_type(&self, index: usize) -> Result<Datatype> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| column_datatype(store, exports, stmt, index))
    }

    /// Name of a result column.
    pub fn column_name(&self, index: usize) -> Result<String> {
        let column = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| {
            let name = exports.column_name.call(&mut *store, (stmt, column))?;
            exports
                .bridge
                .read_opt_cstring(&*store, ptr(name))?
                .ok_or_else(|| out_of_range(index))
        })
    }

    /// Declared type of a result column; `None` for expressions and
    /// untyped columns.
    pub fn column_decltype(&self, index: usize) -> Result<Option<String>> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| {
            let decltype = exports.column_decltype.call(&mut *store, (stmt, index))?;
            exports.bridge.read_opt_cstring(&*store, ptr(decltype))
        })
    }

    /// Column as text; NULL reads as the empty string.
    pub fn column_text(&self, index: usize) -> Result<String> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| read_text(store, exports, stmt, index))
    }

    /// Column as bytes; NULL reads as an empty buffer.
    pub fn column_blob(&self, index: usize) -> Result<Vec<u8>> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| read_blob(store, exports, stmt, index))
    }

    /// Column as a double.
    pub fn column_double(&self, index: usize) -> Result<f64> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| {
            Ok(exports.column_double.call(&mut *store, (stmt, index))?)
        })
    }

    /// Column as a 32-bit integer, truncated by the engine.
    pub fn column_int(&self, index: usize) -> Result<i32> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| {
            Ok(exports.column_int.call(&mut *store, (stmt, index))?)
        })
    }

    /// Column as a 64-bit integer.
    pub fn column_int64(&self, index: usize) -> Result<i64> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| {
            Ok(exports.column_int64.call(&mut *store, (stmt, index))?)
        })
    }

    /// Column decoded by its storage class. Integers keep all 64 bits.
    pub fn column_value(&self, index: usize) -> Result<Value> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| read_value(store, exports, stmt, index, false))
    }

    /// Like [`Statement::column_value`], but integers go through the 32-bit
    /// accessor: exact when the value fits in an `i32`, truncated otherwise.
    pub fn column_value_narrow(&self, index: usize) -> Result<Value> {
        let index = engine_index(index)?;
        self.with_stmt(|store, exports, stmt| read_value(store, exports, stmt, index, true))
    }

    /// Every column of the current row.
    pub fn columns(&self) -> Result<Vec<Value>> {
        self.read_row(false)
    }

    /// Every column of the current row, integers read as in
    /// [`Statement::column_value_narrow`].
    pub fn columns_narrow(&self) -> Result<Vec<Value>> {
        self.read_row(true)
    }

    fn read_row(&self, narrow: bool) -> Result<Vec<Value>> {
        self.with_stmt(|store, exports, stmt| {
            let count = exports.column_count.call(&mut *store, (stmt,))?;
            (0..count)
                .map(|index| read_value(store, exports, stmt, index, narrow))
                .collect()
        })
    }

    /// Resets, binds `values` from parameter 1, and iterates the rows.
    pub fn query(&mut self, values: &[Value]) -> Result<Rows<'_>> {
        self.reset()?;
        self.bind_values(values)?;
        Ok(Rows {
            stmt: self,
            done: false,
        })
    }

    /// Releases the statement. A second call raises MISUSE.
    pub fn finalize(&mut self) -> Result<()> {
        let outcome = self.with_stmt(|store, exports, stmt| {
            store.data_mut().untrack_statement(self.db, self.handle);
            let rc = exports.finalize.call(&mut *store, (stmt,))?;
            trace!(stmt, rc, "stmt.finalize");
            exports.check(&mut *store, rc, Some(self.db))
        });
        // Dead whatever finalize reported; the engine released it either way.
        self.live = false;
        outcome
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        match self.finalize() {
            Ok(()) => {}
            // Already released by Database::close.
            Err(err) if err.code() == Some(codes::MISUSE) => {
                trace!(stmt = self.handle, "statement outlived its connection");
            }
            Err(err) => warn!(stmt = self.handle, error = %err, "failed to finalize dropped statement"),
        }
    }
}

/// Rows produced by [`Statement::query`].
///
/// Stops after the first error.
#[derive(Debug)]
pub struct Rows<'a> {
    stmt: &'a mut Statement,
    done: bool,
}

impl Iterator for Rows<'_> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stmt.step() {
            Ok(true) => Some(self.stmt.columns()),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn byte_len(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        SqliteError::with_message(codes::TOOBIG, format!("{len} byte parameter")).into()
    })
}

fn out_of_range(index: usize) -> Error {
    SqliteError::with_message(codes::RANGE, format!("column {index} out of range")).into()
}

fn column_datatype(
    store: &mut Store<HostState>,
    exports: &EngineExports,
    stmt: i32,
    index: i32,
) -> Result<Datatype> {
    let tag = exports.column_type.call(&mut *store, (stmt, index))?;
    Datatype::try_from(tag).map_err(|raw| Error::abi(format!("unknown column type {raw}")))
}

fn column_len(
    store: &mut Store<HostState>,
    exports: &EngineExports,
    stmt: i32,
    index: i32,
) -> Result<usize> {
    let len = exports.column_bytes.call(&mut *store, (stmt, index))?;
    usize::try_from(len).map_err(|_| Error::abi(format!("negative column length {len}")))
}

// The pointer is fetched before the length so the engine has already
// converted the value to the requested representation.
fn read_text(
    store: &mut Store<HostState>,
    exports: &EngineExports,
    stmt: i32,
    index: i32,
) -> Result<String> {
    let text = exports.column_text.call(&mut *store, (stmt, index))?;
    let len = column_len(store, exports, stmt, index)?;
    if text == 0 || len == 0 {
        return Ok(String::new());
    }
    let bytes = exports.bridge.slice_bytes(&*store, ptr(text), len)?;
    Ok(String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned()))
}

fn read_blob(
    store: &mut Store<HostState>,
    exports: &EngineExports,
    stmt: i32,
    index: i32,
) -> Result<Vec<u8>> {
    let blob = exports.column_blob.call(&mut *store, (stmt, index))?;
    let len = column_len(store, exports, stmt, index)?;
    if blob == 0 || len == 0 {
        return Ok(Vec::new());
    }
    exports.bridge.slice_bytes(&*store, ptr(blob), len)
}

fn read_value(
    store: &mut Store<HostState>,
    exports: &EngineExports,
    stmt: i32,
    index: i32,
    narrow: bool,
) -> Result<Value> {
    Ok(match column_datatype(store, exports, stmt, index)? {
        Datatype::Null => Value::Null,
        Datatype::Integer if narrow => {
            Value::Integer(i64::from(exports.column_int.call(&mut *store, (stmt, index))?))
        }
        Datatype::Integer => Value::Integer(exports.column_int64.call(&mut *store, (stmt, index))?),
        Datatype::Float => Value::Float(exports.column_double.call(&mut *store, (stmt, index))?),
        Datatype::Text => Value::Text(read_text(store, exports, stmt, index)?),
        Datatype::Blob => Value::Blob(read_blob(store, exports, stmt, index)?),
    })
}
