//! The sandboxed engine instance.
//!
//! [`Sqlite`] owns one wasmtime store holding the engine's memory and all
//! host-side tables ([`HostState`]). Every database operation takes the
//! store lock for the length of one engine call; a callback that tries to
//! re-enter the same instance gets [`Error::Reentrant`].

mod config;
mod exports;
mod imports;
mod state;

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::debug;
use wasmtime::{AsContext, AsContextMut, Linker, Module, Store};

pub use config::{BackendKind, EngineConfig, OptLevel};
pub use exports::EngineExports;
pub(crate) use state::ExecSink;
pub use state::HostState;

use crate::db::{Database, OpenOptions};
use crate::primitives::memory::{ptr, PTR_SIZE};
use crate::types::{constants::codes, Error, Result, SqliteError};
use crate::vfs::{IoCounters, LocalVfs, MemoryOnlyVfs, Vfs};

/// A compiled engine module together with the wasmtime engine that
/// compiled it.
#[derive(Clone)]
pub struct EngineModule {
    engine: wasmtime::Engine,
    module: Module,
}

impl EngineModule {
    /// Compiles module bytes (binary or text format).
    pub fn from_bytes(bytes: &[u8], config: &EngineConfig) -> Result<Self> {
        let engine = wasmtime::Engine::new(&config.wasmtime_config())?;
        let module = Module::new(&engine, bytes)?;
        Ok(Self { engine, module })
    }

    /// Reads and compiles a module file.
    pub fn from_file(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes, config)
    }

    /// The wasmtime engine.
    pub fn engine(&self) -> &wasmtime::Engine {
        &self.engine
    }

    /// The compiled module.
    pub fn module(&self) -> &Module {
        &self.module
    }
}

impl std::fmt::Debug for EngineModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineModule")
            .field("name", &self.module.name())
            .finish_non_exhaustive()
    }
}

struct Shared {
    store: Mutex<Store<HostState>>,
    holder: Mutex<Option<ThreadId>>,
    exports: Arc<EngineExports>,
    engine: wasmtime::Engine,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.store.get_mut().data_mut();
        if !state.connections.is_empty() {
            debug!(open = state.connections.len(), "engine dropped with open connections");
        }
        state.vfs.close_all();
    }
}

/// Clears the holder slot when the store lock is released.
struct Held<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for Held<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// A live engine instance. Cheap to clone; clones share the instance.
#[derive(Clone)]
pub struct Sqlite {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Sqlite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sqlite").finish_non_exhaustive()
    }
}

impl Sqlite {
    /// Instantiates a compiled module, initializes the library, and
    /// registers the configured default backend.
    pub fn instantiate(module: &EngineModule, config: &EngineConfig) -> Result<Self> {
        let fallback: Arc<dyn Vfs> = match config.random_seed {
            Some(seed) => Arc::new(MemoryOnlyVfs::seeded(seed)),
            None => Arc::new(MemoryOnlyVfs::new()),
        };
        let mut store = Store::new(
            &module.engine,
            HostState::new(fallback, config.max_memory_pages),
        );
        store.limiter(|state| &mut state.limits);

        let mut linker = Linker::new(&module.engine);
        imports::link(&mut linker)?;
        let instance = linker.instantiate(&mut store, &module.module)?;
        let exports = Arc::new(EngineExports::bind(&mut store, &instance)?);
        store.data_mut().exports = Some(Arc::clone(&exports));

        let rc = exports.initialize.call(&mut store, ())?;
        let actual = exports.libversion_number.call(&mut store, ())?;
        if actual != config.expected_version {
            return Err(Error::VersionMismatch {
                expected: config.expected_version,
                actual,
            });
        }
        exports.check(&mut store, rc, None)?;

        if config.default_backend == BackendKind::Local {
            register_vfs(&exports, &mut store, Arc::new(LocalVfs::new()), true)?;
        }
        debug!(version = actual, backend = ?config.default_backend, "engine.instantiate");

        Ok(Self {
            shared: Arc::new(Shared {
                store: Mutex::new(store),
                holder: Mutex::new(None),
                exports,
                engine: module.engine.clone(),
            }),
        })
    }

    /// Compiles and instantiates a module file.
    pub fn from_file(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        let module = EngineModule::from_file(path, config)?;
        Self::instantiate(&module, config)
    }

    /// Reads and compiles a module without blocking the async runtime.
    ///
    /// Instantiation and every database call stay synchronous.
    pub async fn load_module_async(
        path: impl AsRef<Path>,
        config: &EngineConfig,
    ) -> Result<EngineModule> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let config = config.clone();
        tokio::task::spawn_blocking(move || EngineModule::from_bytes(&bytes, &config))
            .await
            .map_err(|err| Error::Config(format!("module compilation task failed: {err}")))?
    }

    /// Runs `f` with exclusive access to the store.
    pub(crate) fn with_store<R>(
        &self,
        f: impl FnOnce(&mut Store<HostState>, &EngineExports) -> Result<R>,
    ) -> Result<R> {
        let me = thread::current().id();
        if *self.shared.holder.lock() == Some(me) {
            return Err(Error::Reentrant);
        }
        let mut store = self.shared.store.lock();
        *self.shared.holder.lock() = Some(me);
        let _held = Held(&self.shared.holder);
        f(&mut store, &self.shared.exports)
    }

    /// Read-only look at the host tables.
    pub fn inspect<R>(&self, f: impl FnOnce(&HostState) -> R) -> Result<R> {
        self.with_store(|store, _| Ok(f(store.data())))
    }

    /// Registers a storage backend under its name; `make_default` makes it
    /// the backend used when a connection names none. The last default
    /// registered wins.
    pub fn register_vfs(&self, vfs: Arc<dyn Vfs>, make_default: bool) -> Result<()> {
        self.with_store(|store, exports| register_vfs(exports, store, vfs, make_default).map(drop))
    }

    /// Unregisters a backend previously passed to [`Sqlite::register_vfs`].
    pub fn unregister_vfs(&self, vfs: &Arc<dyn Vfs>) -> Result<()> {
        self.with_store(|store, exports| {
            let id = store.data().vfs.backend_id(vfs).ok_or_else(|| {
                Error::misuse(format!("vfs {} is not registered", vfs.name()))
            })?;
            let rc = exports.vfs_unregister.call(&mut *store, (id as i32,))?;
            exports.check(&mut *store, rc, None)?;
            store.data_mut().vfs.unbind_backend(id);
            debug!(vfs = vfs.name(), id, "vfs.unregister");
            Ok(())
        })
    }

    /// Opens a connection.
    pub fn open(&self, path: &str, options: OpenOptions) -> Result<Database> {
        let (db, serial) = self.with_store(|store, exports| {
            let (rc, db) = exports.bridge.scoped(store, |store, scratch| {
                let z_path = scratch.c_string(&mut *store, path)? as i32;
                let pp_db = scratch.calloc(&mut *store, PTR_SIZE)? as i32;
                let rc = match (options.flags, options.vfs.as_deref()) {
                    (None, None) => exports.open.call(&mut *store, (z_path, pp_db))?,
                    (flags, vfs) => {
                        let z_vfs = match vfs {
                            Some(name) => scratch.c_string(&mut *store, name)? as i32,
                            None => 0,
                        };
                        let flags = flags.unwrap_or_else(OpenOptions::default_flags);
                        exports
                            .open_v2
                            .call(&mut *store, (z_path, pp_db, flags.bits(), z_vfs))?
                    }
                };
                let db = exports.bridge.read_u32(&*store, ptr(pp_db))?;
                Ok((rc, db))
            })?;
            if rc != codes::OK {
                let err = match db {
                    0 => SqliteError::new(rc),
                    db => {
                        let err = exports.last_error(&mut *store, db)?;
                        exports.close.call(&mut *store, (db as i32,))?;
                        err.unwrap_or_else(|| SqliteError::new(rc))
                    }
                };
                debug!(path, error = %err, "db.open failed");
                return Err(err.into());
            }
            debug!(path, db, vfs = ?options.vfs, "db.open");
            Ok((db, store.data_mut().track_connection(db)))
        })?;
        Ok(Database::new(self.clone(), db, serial))
    }

    /// Opens a fresh in-memory connection holding a copy of `snapshot`.
    ///
    /// The snapshot is deserialized into a scratch connection and copied
    /// into the new one with the backup API, attached as `schema`
    /// (default `main`).
    pub fn load(&self, snapshot: &[u8], schema: Option<&str>) -> Result<Database> {
        let db = self.open(":memory:", OpenOptions::new())?;
        let mut scratch = self.open(":memory:", OpenOptions::new())?;
        let copied = scratch
            .deserialize(snapshot)
            .and_then(|()| db.backup_from(&scratch, schema.unwrap_or("main")));
        let closed = scratch.close();
        copied?;
        closed?;
        Ok(db)
    }

    /// Compiles a loadable extension with this instance's wasmtime engine.
    pub fn compile_extension(&self, bytes: &[u8]) -> Result<Module> {
        Ok(Module::new(&self.shared.engine, bytes)?)
    }

    /// Calls `sqlite3_shutdown`.
    pub fn shutdown(&self) -> Result<()> {
        self.with_store(|store, exports| {
            let rc = exports.shutdown.call(&mut *store, ())?;
            debug!(rc, "engine.shutdown");
            exports.check(store, rc, None)
        })
    }

    /// The engine's library version string, e.g. `3.46.1`.
    pub fn version(&self) -> Result<String> {
        self.with_store(|store, exports| {
            let p = exports.libversion.call(&mut *store, ())?;
            exports.bridge.read_cstring(&*store, ptr(p))
        })
    }

    /// Read/write dispatch counts since instantiation.
    pub fn io_counters(&self) -> Result<IoCounters> {
        self.inspect(|state| state.vfs().counters())
    }

    /// Number of `io_read` dispatches.
    pub fn read_counter(&self) -> Result<u64> {
        Ok(self.io_counters()?.reads)
    }

    /// Number of `io_write` dispatches.
    pub fn write_counter(&self) -> Result<u64> {
        Ok(self.io_counters()?.writes)
    }
}

/// Registers `vfs` with the engine and binds the id it assigns.
///
/// Names are unique per instance; the engine itself would accept a
/// duplicate and shadow the earlier backend.
pub(crate) fn register_vfs(
    exports: &EngineExports,
    mut store: impl AsContextMut<Data = HostState>,
    vfs: Arc<dyn Vfs>,
    make_default: bool,
) -> Result<u32> {
    let name = vfs.name().to_owned();
    if store.as_context().data().vfs.backend_named(&name).is_some() {
        return Err(Error::misuse(format!("vfs {name} is already registered")));
    }
    let (rc, id) = exports.bridge.scoped(&mut store, |store, scratch| {
        let z_name = scratch.c_string(&mut *store, &name)? as i32;
        let pp_vfs = scratch.calloc(&mut *store, PTR_SIZE)?;
        let rc = exports
            .vfs_register
            .call(&mut *store, (z_name, i32::from(make_default), pp_vfs as i32))?;
        let id = exports.bridge.read_u32(&*store, pp_vfs)?;
        Ok((rc, id))
    })?;
    exports.check(&mut store, rc, None)?;
    if id == 0 {
        return Err(Error::abi(format!("engine registered vfs {name} without an id")));
    }
    store.as_context_mut().data_mut().vfs.bind_backend(id, vfs);
    debug!(vfs = %name, id, make_default, "vfs.register");
    Ok(id)
}
