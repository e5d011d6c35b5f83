use wasmtime::{AsContext, AsContextMut, Instance, Memory, TypedFunc};

use super::Ptr;
use crate::types::{constants::codes, Error, Result, SqliteError};

/// Typed access to the engine's linear memory plus its allocator.
///
/// The bridge never caches a view of memory: every accessor borrows the
/// current buffer from the store, so pointers stay valid across growth.
#[derive(Clone)]
pub struct MemoryBridge {
    memory: Memory,
    malloc: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
}

impl MemoryBridge {
    /// Binds `memory`, `sqlite3_malloc`, and `sqlite3_free` from an instance.
    pub fn from_instance(mut store: impl AsContextMut, instance: &Instance) -> Result<Self> {
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(Error::MissingExport("memory"))?;
        let malloc = instance
            .get_typed_func::<i32, i32>(&mut store, "sqlite3_malloc")
            .map_err(|_| Error::MissingExport("sqlite3_malloc"))?;
        let free = instance
            .get_typed_func::<i32, ()>(&mut store, "sqlite3_free")
            .map_err(|_| Error::MissingExport("sqlite3_free"))?;
        Ok(Self {
            memory,
            malloc,
            free,
        })
    }

    /// The underlying memory export.
    pub fn memory(&self) -> Memory {
        self.memory
    }

    /// Allocates `size` bytes with the engine allocator.
    pub fn malloc(&self, store: impl AsContextMut, size: usize) -> Result<Ptr> {
        let request = i32::try_from(size).map_err(|_| {
            SqliteError::with_message(codes::TOOBIG, format!("{size} byte allocation"))
        })?;
        let ptr = self.malloc.call(store, request).map_err(Error::from_wasm)?;
        if ptr == 0 {
            return Err(SqliteError::with_message(
                codes::NOMEM,
                format!("engine allocator refused {size} bytes"),
            )
            .into());
        }
        Ok(super::ptr(ptr))
    }

    /// Allocates `size` zeroed bytes.
    pub fn calloc(&self, mut store: impl AsContextMut, size: usize) -> Result<Ptr> {
        let ptr = self.malloc(&mut store, size)?;
        let zeroed = self.slice_bytes_mut(&mut store, ptr, size).map(|dst| dst.fill(0));
        self.keep_or_free(store, ptr, zeroed)
    }

    /// Releases memory obtained from [`MemoryBridge::malloc`]. Null is a no-op.
    pub fn free(&self, store: impl AsContextMut, ptr: Ptr) -> Result<()> {
        if ptr == 0 {
            return Ok(());
        }
        self.free.call(store, ptr as i32).map_err(Error::from_wasm)
    }

    /// Copies `s` into a fresh NUL-terminated engine buffer.
    pub fn c_string(&self, mut store: impl AsContextMut, s: &str) -> Result<Ptr> {
        let ptr = self.malloc(&mut store, s.len() + 1)?;
        let written = self.slice_bytes_mut(&mut store, ptr, s.len() + 1).map(|dst| {
            dst[..s.len()].copy_from_slice(s.as_bytes());
            dst[s.len()] = 0;
        });
        self.keep_or_free(store, ptr, written)
    }

    /// Copies `data` into a fresh engine buffer (at least one byte long).
    pub fn alloc_bytes(&self, mut store: impl AsContextMut, data: &[u8]) -> Result<Ptr> {
        let ptr = self.malloc(&mut store, data.len().max(1))?;
        let written = self.write_bytes(&mut store, ptr, data);
        self.keep_or_free(store, ptr, written)
    }

    /// Hands back a fresh allocation, or frees it if filling it failed.
    fn keep_or_free(&self, store: impl AsContextMut, ptr: Ptr, filled: Result<()>) -> Result<Ptr> {
        match filled {
            Ok(()) => Ok(ptr),
            Err(err) => {
                self.free(store, ptr)?;
                Err(err)
            }
        }
    }

    /// Reads a NUL-terminated string.
    pub fn read_cstring(&self, store: impl AsContext, ptr: Ptr) -> Result<String> {
        super::read_cstr(self.memory.data(&store), ptr)
    }

    /// Reads an optional NUL-terminated string; null maps to `None`.
    pub fn read_opt_cstring(&self, store: impl AsContext, ptr: Ptr) -> Result<Option<String>> {
        if ptr == 0 {
            return Ok(None);
        }
        self.read_cstring(store, ptr).map(Some)
    }

    /// Copies `len` bytes out of engine memory.
    pub fn slice_bytes(&self, store: impl AsContext, ptr: Ptr, len: usize) -> Result<Vec<u8>> {
        Ok(super::bytes(self.memory.data(&store), ptr, len)?.to_vec())
    }

    fn slice_bytes_mut<'a, T: 'a>(
        &self,
        store: impl Into<wasmtime::StoreContextMut<'a, T>>,
        ptr: Ptr,
        len: usize,
    ) -> Result<&'a mut [u8]> {
        super::bytes_mut(self.memory.data_mut(store), ptr, len)
    }

    /// Copies `data` into engine memory at `ptr`.
    pub fn write_bytes(&self, mut store: impl AsContextMut, ptr: Ptr, data: &[u8]) -> Result<()> {
        super::bytes_mut(self.memory.data_mut(&mut store), ptr, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Writes `s` into a caller-provided buffer of `capacity` bytes.
    pub fn write_bounded_string(
        &self,
        mut store: impl AsContextMut,
        ptr: Ptr,
        capacity: usize,
        s: &str,
    ) -> Result<()> {
        super::write_bounded_str(self.memory.data_mut(&mut store), ptr, capacity, s)
    }

    /// Reads a pointer-sized slot.
    pub fn read_u32(&self, store: impl AsContext, ptr: Ptr) -> Result<u32> {
        super::read_u32(self.memory.data(&store), ptr)
    }

    /// Writes a pointer-sized slot.
    pub fn write_u32(&self, mut store: impl AsContextMut, ptr: Ptr, v: u32) -> Result<()> {
        super::write_u32(self.memory.data_mut(&mut store), ptr, v)
    }

    /// Reads a 64-bit integer.
    pub fn read_i64(&self, store: impl AsContext, ptr: Ptr) -> Result<i64> {
        super::read_i64(self.memory.data(&store), ptr)
    }

    /// Writes a 64-bit integer.
    pub fn write_i64(&self, mut store: impl AsContextMut, ptr: Ptr, v: i64) -> Result<()> {
        super::write_i64(self.memory.data_mut(&mut store), ptr, v)
    }

    /// Reads a double.
    pub fn read_f64(&self, store: impl AsContext, ptr: Ptr) -> Result<f64> {
        super::read_f64(self.memory.data(&store), ptr)
    }

    /// Writes a double.
    pub fn write_f64(&self, mut store: impl AsContextMut, ptr: Ptr, v: f64) -> Result<()> {
        super::write_f64(self.memory.data_mut(&mut store), ptr, v)
    }

    /// Runs `f` with a scratch arena whose allocations are released on
    /// every exit path, including errors raised by `f`.
    pub fn scoped<S, R>(
        &self,
        store: &mut S,
        f: impl FnOnce(&mut S, &mut Scratch) -> Result<R>,
    ) -> Result<R>
    where
        S: AsContextMut,
    {
        let mut scratch = Scratch {
            bridge: self.clone(),
            ptrs: Vec::new(),
        };
        let outcome = f(store, &mut scratch);
        let released = scratch.release(store);
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
        }
    }
}

impl std::fmt::Debug for MemoryBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBridge").finish_non_exhaustive()
    }
}

/// Short-lived engine allocations owned by a [`MemoryBridge::scoped`] call.
pub struct Scratch {
    bridge: MemoryBridge,
    ptrs: Vec<Ptr>,
}

impl Scratch {
    fn track(&mut self, ptr: Ptr) -> Ptr {
        self.ptrs.push(ptr);
        ptr
    }

    /// Allocates `size` bytes.
    pub fn alloc(&mut self, store: impl AsContextMut, size: usize) -> Result<Ptr> {
        let ptr = self.bridge.malloc(store, size)?;
        Ok(self.track(ptr))
    }

    /// Allocates `size` zeroed bytes.
    pub fn calloc(&mut self, store: impl AsContextMut, size: usize) -> Result<Ptr> {
        let ptr = self.bridge.calloc(store, size)?;
        Ok(self.track(ptr))
    }

    /// Copies `s` into a NUL-terminated scratch buffer.
    pub fn c_string(&mut self, store: impl AsContextMut, s: &str) -> Result<Ptr> {
        let ptr = self.bridge.c_string(store, s)?;
        Ok(self.track(ptr))
    }

    /// Copies `data` into a scratch buffer.
    pub fn bytes(&mut self, store: impl AsContextMut, data: &[u8]) -> Result<Ptr> {
        let ptr = self.bridge.alloc_bytes(store, data)?;
        Ok(self.track(ptr))
    }

    /// Removes `ptr` from the arena; the caller now owns it.
    pub fn forget(&mut self, ptr: Ptr) {
        self.ptrs.retain(|&p| p != ptr);
    }

    /// The bridge the arena allocates through.
    pub fn bridge(&self) -> &MemoryBridge {
        &self.bridge
    }

    fn release(mut self, mut store: impl AsContextMut) -> Result<()> {
        let mut first_err = None;
        while let Some(ptr) = self.ptrs.pop() {
            if let Err(err) = self.bridge.free(&mut store, ptr) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
