//! Engine-side calling convention for user functions.
//!
//! The engine calls `sqlite3_wasm_function_*` with a context pointer whose
//! user data is the host function id. Arguments arrive as an array of
//! value handles; results go back through the `sqlite3_result_*` setters.

use tracing::trace;
use wasmtime::{AsContextMut, Caller, TypedFunc};

use super::Invocation;
use crate::engine::{EngineExports, HostState};
use crate::primitives::memory::{self, ptr};
use crate::types::{
    constants::{codes, destructor},
    to_scalar, Datatype, Error, ExtendedValue, Result, Value,
};

/// Handles one `sqlite3_wasm_function_{func,step,inverse,value,final}` call.
///
/// Only protocol violations escape as `Err`; everything the callable
/// raises is reported to the engine through the context.
pub(crate) fn invoke(
    caller: &mut Caller<'_, HostState>,
    which: Invocation,
    ctx: i32,
    argc: i32,
    argv: i32,
) -> Result<()> {
    let exports = caller.data().exports()?;
    let id = exports.user_data.call(&mut *caller, (ctx,))? as u32;
    let args = if which.takes_args() {
        decode_args(&exports, &mut *caller, argc, argv)?
    } else {
        Vec::new()
    };
    trace!(id, ?which, argc = args.len(), "function.invoke");
    let outcome = caller.data_mut().functions.must_get_mut(id)?.call(which, &args)?;
    report(&exports, &mut *caller, ctx, which, outcome)
}

/// Reads `argc` value handles from `argv` and decodes each by its tag.
pub(crate) fn decode_args(
    exports: &EngineExports,
    mut store: impl AsContextMut,
    argc: i32,
    argv: i32,
) -> Result<Vec<Value>> {
    let argc = usize::try_from(argc).map_err(|_| Error::abi(format!("negative argc {argc}")))?;
    let mut args = Vec::with_capacity(argc);
    for index in 0..argc {
        let mem = exports.bridge.memory();
        let handle = memory::deref_index(mem.data(&store), ptr(argv), index)?;
        args.push(decode_value(exports, &mut store, handle as i32)?);
    }
    Ok(args)
}

/// Decodes one `sqlite3_value*`.
pub(crate) fn decode_value(
    exports: &EngineExports,
    mut store: impl AsContextMut,
    handle: i32,
) -> Result<Value> {
    let tag = exports.value_type.call(&mut store, (handle,))?;
    let datatype =
        Datatype::try_from(tag).map_err(|raw| Error::abi(format!("unknown value type {raw}")))?;
    Ok(match datatype {
        Datatype::Null => Value::Null,
        Datatype::Integer => Value::Integer(exports.value_int64.call(&mut store, (handle,))?),
        Datatype::Float => Value::Float(exports.value_double.call(&mut store, (handle,))?),
        Datatype::Text => {
            let text = exports.value_text.call(&mut store, (handle,))?;
            Value::Text(exports.bridge.read_opt_cstring(&mut store, ptr(text))?.unwrap_or_default())
        }
        Datatype::Blob => {
            let data = exports.value_blob.call(&mut store, (handle,))?;
            let len = exports.value_bytes.call(&mut store, (handle,))?;
            let len = usize::try_from(len).unwrap_or(0);
            if data == 0 || len == 0 {
                Value::Blob(Vec::new())
            } else {
                Value::Blob(exports.bridge.slice_bytes(&mut store, ptr(data), len)?)
            }
        }
    })
}

/// Sends the callable's outcome back through the context.
pub(crate) fn report(
    exports: &EngineExports,
    mut store: impl AsContextMut,
    ctx: i32,
    which: Invocation,
    outcome: Result<ExtendedValue>,
) -> Result<()> {
    let outcome = outcome.and_then(|value| {
        if which.reports_value() {
            to_scalar(value).map(Some)
        } else {
            Ok(None)
        }
    });
    match outcome {
        Ok(Some(value)) => set_result(exports, &mut store, ctx, value),
        Ok(None) => Ok(()),
        Err(err) => set_error(exports, &mut store, ctx, err),
    }
}

fn set_result(
    exports: &EngineExports,
    mut store: impl AsContextMut,
    ctx: i32,
    value: Value,
) -> Result<()> {
    match value {
        Value::Null => exports.result_null.call(&mut store, (ctx,))?,
        Value::Integer(v) => exports.result_int64.call(&mut store, (ctx, v))?,
        Value::Float(v) => exports.result_double.call(&mut store, (ctx, v))?,
        Value::Text(text) => {
            let buf = exports.bridge.c_string(&mut store, &text)?;
            hand_over(exports, store, &exports.result_text, ctx, buf, text.len())?;
        }
        Value::Blob(data) => {
            let buf = exports.bridge.alloc_bytes(&mut store, &data)?;
            hand_over(exports, store, &exports.result_blob, ctx, buf, data.len())?;
        }
    }
    Ok(())
}

/// Passes a malloc'd buffer to a result setter. With a free destructor
/// the engine owns it afterwards; otherwise it is copied and freed here.
fn hand_over(
    exports: &EngineExports,
    mut store: impl AsContextMut,
    setter: &TypedFunc<(i32, i32, i32, i32), ()>,
    ctx: i32,
    buf: u32,
    len: usize,
) -> Result<()> {
    let Ok(n) = i32::try_from(len) else {
        exports.bridge.free(&mut store, buf)?;
        return exports
            .result_error_code
            .call(&mut store, (ctx, codes::TOOBIG))
            .map_err(Error::from);
    };
    match exports.free_destructor() {
        Some(free) => setter.call(&mut store, (ctx, buf as i32, n, free))?,
        None => {
            let set = setter.call(&mut store, (ctx, buf as i32, n, destructor::TRANSIENT));
            exports.bridge.free(&mut store, buf)?;
            set?;
        }
    }
    Ok(())
}

fn set_error(exports: &EngineExports, mut store: impl AsContextMut, ctx: i32, err: Error) -> Result<()> {
    let Some(code) = err.code() else {
        return Err(err);
    };
    trace!(code, error = %err, "function.error");
    if code != codes::ERROR {
        exports.result_error_code.call(&mut store, (ctx, code))?;
        return Ok(());
    }
    let message = match err.as_sqlite().and_then(|e| e.message()) {
        Some(message) => message.to_owned(),
        None => err.to_string(),
    };
    exports.bridge.scoped(&mut store, |store, scratch| {
        let text = scratch.c_string(&mut *store, &message)?;
        let len = i32::try_from(message.len()).unwrap_or(i32::MAX);
        exports.result_error.call(&mut *store, (ctx, text as i32, len))?;
        Ok(())
    })
}
