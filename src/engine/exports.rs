use wasmtime::{AsContextMut, Instance, Ref, Table, TypedFunc};

use crate::primitives::memory::{ptr, MemoryBridge};
use crate::types::{
    constants::destructor,
    is_success, Error, Result, SqliteError,
};

/// Declares the engine-export table: one typed function per entry, bound
/// by name once after instantiation.
macro_rules! engine_exports {
    ($($field:ident : $name:literal => ($($param:ty),*) -> $ret:ty),* $(,)?) => {
        /// Typed handles to every engine export the host calls.
        pub struct EngineExports {
            $(pub(crate) $field: TypedFunc<($($param,)*), $ret>,)*
            pub(crate) bridge: MemoryBridge,
            table: Option<Table>,
            free_destructor: i32,
        }

        impl EngineExports {
            fn bind_functions(
                mut store: impl AsContextMut,
                instance: &Instance,
                bridge: MemoryBridge,
            ) -> Result<Self> {
                Ok(Self {
                    $($field: instance
                        .get_typed_func::<($($param,)*), $ret>(&mut store, $name)
                        .map_err(|_| Error::MissingExport($name))?,)*
                    bridge,
                    table: None,
                    free_destructor: destructor::TRANSIENT,
                })
            }
        }
    };
}

engine_exports! {
    initialize: "sqlite3_initialize" => () -> i32,
    shutdown: "sqlite3_shutdown" => () -> i32,
    libversion: "sqlite3_libversion" => () -> i32,
    libversion_number: "sqlite3_libversion_number" => () -> i32,
    get_api_routines: "sqlite3_get_api_routines" => () -> i32,

    vfs_register: "sqlite3_wasm_vfs_register" => (i32, i32, i32) -> i32,
    vfs_unregister: "sqlite3_wasm_vfs_unregister" => (i32) -> i32,

    open: "sqlite3_open" => (i32, i32) -> i32,
    open_v2: "sqlite3_open_v2" => (i32, i32, i32, i32) -> i32,
    close: "sqlite3_close" => (i32) -> i32,
    errcode: "sqlite3_errcode" => (i32) -> i32,
    extended_errcode: "sqlite3_extended_errcode" => (i32) -> i32,
    errmsg: "sqlite3_errmsg" => (i32) -> i32,
    exec: "sqlite3_wasm_exec" => (i32, i32, i32, i32) -> i32,
    create_function: "sqlite3_wasm_create_function" => (i32, i32, i32, i32, i32, i32) -> i32,
    changes: "sqlite3_changes" => (i32) -> i32,
    last_insert_rowid: "sqlite3_last_insert_rowid" => (i32) -> i64,
    interrupt: "sqlite3_interrupt" => (i32) -> (),
    get_autocommit: "sqlite3_get_autocommit" => (i32) -> i32,

    prepare_v2: "sqlite3_prepare_v2" => (i32, i32, i32, i32, i32) -> i32,
    finalize: "sqlite3_finalize" => (i32) -> i32,
    reset: "sqlite3_reset" => (i32) -> i32,
    step: "sqlite3_step" => (i32) -> i32,
    clear_bindings: "sqlite3_clear_bindings" => (i32) -> i32,
    bind_parameter_count: "sqlite3_bind_parameter_count" => (i32) -> i32,
    bind_text: "sqlite3_bind_text" => (i32, i32, i32, i32, i32) -> i32,
    bind_blob: "sqlite3_bind_blob" => (i32, i32, i32, i32, i32) -> i32,
    bind_double: "sqlite3_bind_double" => (i32, i32, f64) -> i32,
    bind_int: "sqlite3_bind_int" => (i32, i32, i32) -> i32,
    bind_int64: "sqlite3_bind_int64" => (i32, i32, i64) -> i32,
    bind_null: "sqlite3_bind_null" => (i32, i32) -> i32,

    column_count: "sqlite3_column_count" => (i32) -> i32,
    column_type: "sqlite3_column_type" => (i32, i32) -> i32,
    column_name: "sqlite3_column_name" => (i32, i32) -> i32,
    column_decltype: "sqlite3_column_decltype" => (i32, i32) -> i32,
    column_text: "sqlite3_column_text" => (i32, i32) -> i32,
    column_blob: "sqlite3_column_blob" => (i32, i32) -> i32,
    column_bytes: "sqlite3_column_bytes" => (i32, i32) -> i32,
    column_double: "sqlite3_column_double" => (i32, i32) -> f64,
    column_int: "sqlite3_column_int" => (i32, i32) -> i32,
    column_int64: "sqlite3_column_int64" => (i32, i32) -> i64,

    serialize: "sqlite3_serialize" => (i32, i32, i32, i32) -> i32,
    deserialize: "sqlite3_deserialize" => (i32, i32, i32, i64, i64, i32) -> i32,
    backup_init: "sqlite3_backup_init" => (i32, i32, i32, i32) -> i32,
    backup_step: "sqlite3_backup_step" => (i32, i32) -> i32,
    backup_finish: "sqlite3_backup_finish" => (i32) -> i32,

    value_type: "sqlite3_value_type" => (i32) -> i32,
    value_int64: "sqlite3_value_int64" => (i32) -> i64,
    value_double: "sqlite3_value_double" => (i32) -> f64,
    value_text: "sqlite3_value_text" => (i32) -> i32,
    value_blob: "sqlite3_value_blob" => (i32) -> i32,
    value_bytes: "sqlite3_value_bytes" => (i32) -> i32,
    user_data: "sqlite3_user_data" => (i32) -> i32,

    result_null: "sqlite3_result_null" => (i32) -> (),
    result_int64: "sqlite3_result_int64" => (i32, i64) -> (),
    result_double: "sqlite3_result_double" => (i32, f64) -> (),
    result_text: "sqlite3_result_text" => (i32, i32, i32, i32) -> (),
    result_blob: "sqlite3_result_blob" => (i32, i32, i32, i32) -> (),
    result_error: "sqlite3_result_error" => (i32, i32, i32) -> (),
    result_error_code: "sqlite3_result_error_code" => (i32, i32) -> (),
}

impl EngineExports {
    /// Resolves every export, failing on the first one that is missing.
    ///
    /// Also reserves a function-table slot holding `sqlite3_free`, used as
    /// the destructor for buffers whose ownership moves to the engine.
    pub fn bind(mut store: impl AsContextMut, instance: &Instance) -> Result<Self> {
        let bridge = MemoryBridge::from_instance(&mut store, instance)?;
        let mut exports = Self::bind_functions(&mut store, instance, bridge)?;

        let table = instance.get_table(&mut store, "__indirect_function_table");
        let free = instance.get_func(&mut store, "sqlite3_free");
        if let (Some(table), Some(free)) = (table, free) {
            match table.grow(&mut store, 1, Ref::Func(Some(free))) {
                Ok(slot) => {
                    if let Ok(slot) = i32::try_from(slot) {
                        exports.free_destructor = slot;
                    }
                }
                Err(err) => tracing::debug!(error = %err, "function table is fixed; results are copied"),
            }
        }
        exports.table = table;
        Ok(exports)
    }

    /// The engine's memory and allocator.
    pub fn bridge(&self) -> &MemoryBridge {
        &self.bridge
    }

    /// The engine's indirect function table, when exported.
    pub fn table(&self) -> Option<Table> {
        self.table
    }

    /// Destructor argument that hands a malloc'd buffer to the engine.
    ///
    /// `None` means the engine copies (`SQLITE_TRANSIENT`) and the caller
    /// still owns the buffer.
    pub fn free_destructor(&self) -> Option<i32> {
        (self.free_destructor != destructor::TRANSIENT).then_some(self.free_destructor)
    }

    /// Error state of connection `db`; `None` if the engine reports success.
    pub fn last_error(&self, mut store: impl AsContextMut, db: u32) -> Result<Option<SqliteError>> {
        let handle = db as i32;
        let code = self.errcode.call(&mut store, (handle,))?;
        if is_success(code) {
            return Ok(None);
        }
        let extended = self.extended_errcode.call(&mut store, (handle,))?;
        let message = self.errmsg.call(&mut store, (handle,))?;
        let message = self.bridge.read_opt_cstring(&mut store, ptr(message))?;
        let err = match message {
            Some(message) => SqliteError::with_message(code, message),
            None => SqliteError::new(code),
        };
        Ok(Some(err.extended(extended)))
    }

    /// Raises for any code other than OK/ROW/DONE, with the connection's
    /// message when `db` is given.
    pub fn check(&self, store: impl AsContextMut, rc: i32, db: Option<u32>) -> Result<()> {
        if is_success(rc) {
            return Ok(());
        }
        if let Some(db) = db {
            if let Some(err) = self.last_error(store, db)? {
                return Err(err.into());
            }
        }
        Err(SqliteError::new(rc).into())
    }
}

impl std::fmt::Debug for EngineExports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineExports")
            .field("free_destructor", &self.free_destructor)
            .finish_non_exhaustive()
    }
}
