//! Host side of the engine's `"imports"` module.
//!
//! Storage callbacks land in [`VfsHost`], function callbacks in the
//! [`shim`](crate::func::shim), and exec rows in the registered
//! [`ExecSink`]. Whatever a host capability raises is flattened into a
//! result code; protocol violations come back as traps.

use tracing::{debug, trace, warn};
use wasmtime::{Caller, Linker};

use super::state::{ExecSink, HostState};
use crate::db::ExecValue;
use crate::func::{shim, Invocation};
use crate::primitives::memory::{self, ptr};
use crate::types::{constants::codes, wrap, Error, Result};
use crate::vfs::VfsHost;

const MODULE: &str = "imports";

type Host<'a> = Caller<'a, HostState>;

/// Runs a storage dispatch with simultaneous access to engine memory and
/// the capability tables.
fn dispatch(
    caller: &mut Host<'_>,
    f: impl FnOnce(&mut [u8], &mut VfsHost) -> Result<i32>,
) -> wasmtime::Result<i32> {
    let memory = caller.data().exports()?.bridge.memory();
    let (mem, state) = memory.data_and_store_mut(&mut *caller);
    Ok(f(mem, &mut state.vfs)?)
}

/// Registers every callback the engine imports.
pub(crate) fn link(linker: &mut Linker<HostState>) -> Result<()> {
    link_lifecycle(linker)?;
    link_vfs(linker)?;
    link_io(linker)?;
    link_functions(linker)?;
    Ok(())
}

fn link_lifecycle(linker: &mut Linker<HostState>) -> Result<()> {
    linker.func_wrap(MODULE, "sqlite3_wasm_log", |caller: Host<'_>, z_log: i32| -> wasmtime::Result<()> {
        let exports = caller.data().exports()?;
        let line = exports.bridge.read_cstring(&caller, ptr(z_log))?;
        warn!(target: "wasqlite::engine", "{line}");
        Ok(())
    })?;

    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_os_init",
        |mut caller: Host<'_>| -> wasmtime::Result<i32> {
            let exports = caller.data().exports()?;
            let fallback = caller.data().fallback.clone();
            // Shutdown leaves the engine's vfs list intact, so a later
            // initialize finds the fallback still registered.
            if caller.data().vfs.backend_id(&fallback).is_some() {
                debug!(vfs = fallback.name(), "os_init: fallback already registered");
                return Ok(codes::OK);
            }
            debug!(vfs = fallback.name(), "os_init");
            Ok(wrap(|| super::register_vfs(&exports, &mut caller, fallback, true).map(drop))?)
        },
    )?;

    linker.func_wrap(MODULE, "sqlite3_wasm_os_end", |_caller: Host<'_>| -> i32 {
        debug!("os_end");
        codes::OK
    })?;

    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_exec_callback",
        |mut caller: Host<'_>, id: i32, n_cols: i32, az_cols: i32, az_names: i32| -> wasmtime::Result<i32> {
            let exports = caller.data().exports()?;
            let n = usize::try_from(n_cols)
                .map_err(|_| Error::abi(format!("negative column count {n_cols}")))?;
            let mem = exports.bridge.memory().data(&caller);
            let mut row = Vec::with_capacity(n);
            for i in 0..n {
                let name = memory::deref_index(mem, ptr(az_names), i)?;
                let value = if az_cols == 0 {
                    0
                } else {
                    memory::deref_index(mem, ptr(az_cols), i)?
                };
                row.push(ExecValue {
                    name: memory::read_cstr(mem, name)?,
                    value: if value == 0 {
                        None
                    } else {
                        Some(memory::read_cstr(mem, value)?)
                    },
                });
            }
            let keep_going = match caller.data_mut().exec_sinks.must_get_mut(id as u32)? {
                ExecSink::Collect(rows) => {
                    rows.push(row);
                    true
                }
                ExecSink::Callback(callback) => callback(&row),
            };
            // Non-zero makes the engine stop with SQLITE_ABORT.
            Ok(if keep_going { 0 } else { 1 })
        },
    )?;
    Ok(())
}

fn link_vfs(linker: &mut Linker<HostState>) -> Result<()> {
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_vfs_open",
        |mut caller: Host<'_>, p_vfs: i32, z_name: i32, p_out_file: i32, flags: i32, p_out_flags: i32| {
            dispatch(&mut caller, |mem, vfs| {
                vfs.open(mem, ptr(p_vfs), ptr(z_name), ptr(p_out_file), flags, ptr(p_out_flags))
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_vfs_delete",
        |mut caller: Host<'_>, p_vfs: i32, z_name: i32, sync_dir: i32| {
            dispatch(&mut caller, |mem, vfs| vfs.delete(mem, ptr(p_vfs), ptr(z_name), sync_dir))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_vfs_access",
        |mut caller: Host<'_>, p_vfs: i32, z_name: i32, flags: i32, p_res_out: i32| {
            dispatch(&mut caller, |mem, vfs| {
                vfs.access(mem, ptr(p_vfs), ptr(z_name), flags, ptr(p_res_out))
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_vfs_full_pathname",
        |mut caller: Host<'_>, p_vfs: i32, z_name: i32, n_out: i32, z_out: i32| {
            dispatch(&mut caller, |mem, vfs| {
                vfs.full_pathname(mem, ptr(p_vfs), ptr(z_name), n_out, ptr(z_out))
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_vfs_randomness",
        |mut caller: Host<'_>, p_vfs: i32, n_byte: i32, z_out: i32| {
            dispatch(&mut caller, |mem, vfs| vfs.randomness(mem, ptr(p_vfs), n_byte, ptr(z_out)))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_vfs_sleep",
        |mut caller: Host<'_>, p_vfs: i32, micros: i32| {
            dispatch(&mut caller, |_, vfs| vfs.sleep(ptr(p_vfs), micros))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_vfs_current_time",
        |mut caller: Host<'_>, p_vfs: i32, p_time_out: i32| {
            dispatch(&mut caller, |mem, vfs| vfs.current_time(mem, ptr(p_vfs), ptr(p_time_out)))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_vfs_get_last_error",
        |mut caller: Host<'_>, p_vfs: i32, n_byte: i32, z_out: i32| {
            dispatch(&mut caller, |mem, vfs| {
                vfs.get_last_error(mem, ptr(p_vfs), n_byte, ptr(z_out))
            })
        },
    )?;
    Ok(())
}

fn link_io(linker: &mut Linker<HostState>) -> Result<()> {
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_close",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32| {
            dispatch(&mut caller, |_, vfs| vfs.close(ptr(p_vfs), file_id))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_read",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, p_buf: i32, amount: i32, offset: i64| {
            dispatch(&mut caller, |mem, vfs| {
                vfs.read(mem, ptr(p_vfs), file_id, ptr(p_buf), amount, offset)
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_write",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, p_buf: i32, amount: i32, offset: i64| {
            dispatch(&mut caller, |mem, vfs| {
                vfs.write(mem, ptr(p_vfs), file_id, ptr(p_buf), amount, offset)
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_truncate",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, size: i64| {
            dispatch(&mut caller, |_, vfs| vfs.truncate(ptr(p_vfs), file_id, size))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_sync",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, flags: i32| {
            dispatch(&mut caller, |_, vfs| vfs.sync(ptr(p_vfs), file_id, flags))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_file_size",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, p_size: i32| {
            dispatch(&mut caller, |mem, vfs| vfs.file_size(mem, ptr(p_vfs), file_id, ptr(p_size)))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_lock",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, level: i32| {
            dispatch(&mut caller, |_, vfs| vfs.lock(ptr(p_vfs), file_id, level))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_unlock",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, level: i32| {
            dispatch(&mut caller, |_, vfs| vfs.unlock(ptr(p_vfs), file_id, level))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_check_reserved_lock",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, p_res_out: i32| {
            dispatch(&mut caller, |mem, vfs| {
                vfs.check_reserved_lock(mem, ptr(p_vfs), file_id, ptr(p_res_out))
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_file_control",
        |mut caller: Host<'_>, p_vfs: i32, file_id: i32, op: i32, p_arg: i32| {
            dispatch(&mut caller, |_, vfs| vfs.file_control(ptr(p_vfs), file_id, op, ptr(p_arg)))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_sector_size",
        |mut caller: Host<'_>, _p_vfs: i32, file_id: i32| {
            dispatch(&mut caller, |_, vfs| vfs.sector_size(file_id))
        },
    )?;
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_io_device_characteristics",
        |mut caller: Host<'_>, _p_vfs: i32, file_id: i32| {
            dispatch(&mut caller, |_, vfs| vfs.device_characteristics(file_id))
        },
    )?;
    Ok(())
}

fn link_functions(linker: &mut Linker<HostState>) -> Result<()> {
    for (name, which) in [
        ("sqlite3_wasm_function_func", Invocation::Func),
        ("sqlite3_wasm_function_step", Invocation::Step),
        ("sqlite3_wasm_function_inverse", Invocation::Inverse),
    ] {
        linker.func_wrap(
            MODULE,
            name,
            move |mut caller: Host<'_>, ctx: i32, argc: i32, argv: i32| -> wasmtime::Result<()> {
                Ok(shim::invoke(&mut caller, which, ctx, argc, argv)?)
            },
        )?;
    }
    for (name, which) in [
        ("sqlite3_wasm_function_value", Invocation::Value),
        ("sqlite3_wasm_function_final", Invocation::Final),
    ] {
        linker.func_wrap(
            MODULE,
            name,
            move |mut caller: Host<'_>, ctx: i32| -> wasmtime::Result<()> {
                Ok(shim::invoke(&mut caller, which, ctx, 0, 0)?)
            },
        )?;
    }
    linker.func_wrap(
        MODULE,
        "sqlite3_wasm_function_destroy",
        |mut caller: Host<'_>, p_arg: i32| {
            let id = ptr(p_arg);
            // The engine also destroys after a failed registration, so the
            // entry may already be gone.
            if let Some(entry) = caller.data_mut().release_function(id) {
                debug!(id, name = entry.name(), "function.destroy");
            } else {
                trace!(id, "function.destroy: not registered");
            }
        },
    )?;
    Ok(())
}
