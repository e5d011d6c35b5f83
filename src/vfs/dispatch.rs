use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use super::{Vfs, VfsFile};
use crate::primitives::memory::{self, Ptr};
use crate::primitives::registry::{IdentityRegistry, Registry};
use crate::types::{
    constants::codes, AccessFlag, Error, LockLevel, OpenFlags, Result, SqliteError,
};

/// Read/write dispatch counts. Diagnostics only.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IoCounters {
    /// `io_read` dispatches, successful or not.
    pub reads: u64,
    /// `io_write` dispatches, successful or not.
    pub writes: u64,
}

/// Backend and file tables plus the dispatch entry points the engine's
/// storage imports land in.
///
/// Every entry point returns `Ok(code)` for outcomes the engine should see
/// and `Err` only for protocol violations, which the import layer turns
/// into a trap.
pub struct VfsHost {
    backends: IdentityRegistry<dyn Vfs>,
    files: Registry<Box<dyn VfsFile>>,
    counters: IoCounters,
    last_errors: FxHashMap<u32, SqliteError>,
}

impl Default for VfsHost {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsHost {
    /// Empty tables.
    pub fn new() -> Self {
        Self {
            backends: IdentityRegistry::new("vfs"),
            files: Registry::new("file"),
            counters: IoCounters::default(),
            last_errors: FxHashMap::default(),
        }
    }

    /// Binds a backend to the id the engine assigned it.
    pub fn bind_backend(&mut self, id: u32, vfs: Arc<dyn Vfs>) {
        self.backends.insert_at(id, vfs);
    }

    /// Finds the id a backend object is bound to.
    pub fn backend_id(&self, vfs: &Arc<dyn Vfs>) -> Option<u32> {
        self.backends.id_of(vfs)
    }

    /// Finds the id of the backend registered under `name`.
    pub fn backend_named(&self, name: &str) -> Option<u32> {
        self.backends
            .iter()
            .find(|(_, vfs)| vfs.name() == name)
            .map(|(id, _)| id)
    }

    /// Forgets a backend; later engine calls naming `id` are violations.
    pub fn unbind_backend(&mut self, id: u32) -> Option<Arc<dyn Vfs>> {
        self.last_errors.remove(&id);
        self.backends.remove(id)
    }

    /// Number of bound backends.
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Number of open files.
    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    /// Read/write dispatch counts.
    pub fn counters(&self) -> IoCounters {
        self.counters
    }

    /// The last error a backend reported, if any.
    pub fn last_error(&self, id: u32) -> Option<&SqliteError> {
        self.last_errors.get(&id)
    }

    /// Flattens a backend outcome into a code, remembering the error for
    /// `get_last_error`.
    fn settle(&mut self, vfs_id: u32, outcome: Result<()>) -> Result<i32> {
        match outcome {
            Ok(()) => Ok(codes::OK),
            Err(err) => {
                let Some(code) = err.code() else {
                    return Err(err);
                };
                let structured = match err {
                    Error::Sqlite(inner) => inner,
                    other => SqliteError::with_message(code, other.to_string()),
                };
                trace!(vfs_id, code, error = %structured, "vfs.error");
                self.last_errors.insert(vfs_id, structured);
                Ok(code)
            }
        }
    }

    fn backend(&self, vfs_id: u32) -> Result<Arc<dyn Vfs>> {
        self.backends.must_get(vfs_id).cloned()
    }

    /// `sqlite3_wasm_vfs_open`.
    pub fn open(
        &mut self,
        mem: &mut [u8],
        vfs_id: u32,
        z_name: Ptr,
        p_out_file: Ptr,
        flags: i32,
        p_out_flags: Ptr,
    ) -> Result<i32> {
        let vfs = self.backend(vfs_id)?;
        let path = if z_name == 0 {
            None
        } else {
            Some(memory::read_cstr(mem, z_name)?)
        };
        trace!(vfs_id, path = ?path, flags, "vfs.open");
        let file = match vfs.open(path.as_deref(), OpenFlags(flags)) {
            Ok(file) => file,
            Err(err) => return self.settle(vfs_id, Err(err)),
        };
        let opened = file.open_flags();
        let file_id = self.files.insert(file);
        let written = memory::write_u32(mem, p_out_file, file_id).and_then(|()| {
            if p_out_flags == 0 {
                Ok(())
            } else {
                memory::write_u32(mem, p_out_flags, opened.bits() as u32)
            }
        });
        if let Err(err) = written {
            if let Some(mut file) = self.files.remove(file_id) {
                let _ = file.close();
            }
            return Err(err);
        }
        Ok(codes::OK)
    }

    /// `sqlite3_wasm_vfs_delete`.
    pub fn delete(&mut self, mem: &[u8], vfs_id: u32, z_name: Ptr, sync_dir: i32) -> Result<i32> {
        let vfs = self.backend(vfs_id)?;
        let path = memory::read_cstr(mem, z_name)?;
        trace!(vfs_id, path = %path, "vfs.delete");
        let outcome = vfs.delete(&path, sync_dir != 0);
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_vfs_access`.
    pub fn access(
        &mut self,
        mem: &mut [u8],
        vfs_id: u32,
        z_name: Ptr,
        flags: i32,
        p_res_out: Ptr,
    ) -> Result<i32> {
        let vfs = self.backend(vfs_id)?;
        let path = memory::read_cstr(mem, z_name)?;
        let flag = AccessFlag::try_from(flags)
            .map_err(|raw| Error::abi(format!("unknown access flag {raw}")))?;
        trace!(vfs_id, path = %path, ?flag, "vfs.access");
        let outcome = vfs
            .access(&path, flag)
            .and_then(|found| memory::write_bool(mem, p_res_out, found));
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_vfs_full_pathname`.
    pub fn full_pathname(
        &mut self,
        mem: &mut [u8],
        vfs_id: u32,
        z_name: Ptr,
        n_out: i32,
        z_out: Ptr,
    ) -> Result<i32> {
        let vfs = self.backend(vfs_id)?;
        let path = memory::read_cstr(mem, z_name)?;
        trace!(vfs_id, path = %path, "vfs.full_pathname");
        let capacity = usize::try_from(n_out).unwrap_or(0);
        let outcome = vfs
            .full_pathname(&path)
            .and_then(|full| memory::write_bounded_str(mem, z_out, capacity, &full));
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_vfs_randomness`.
    pub fn randomness(&mut self, mem: &mut [u8], vfs_id: u32, n_byte: i32, z_out: Ptr) -> Result<i32> {
        let vfs = self.backend(vfs_id)?;
        let len = usize::try_from(n_byte).unwrap_or(0);
        let buf = memory::bytes_mut(mem, z_out, len)?;
        trace!(vfs_id, len, "vfs.randomness");
        let outcome = vfs.randomness(buf);
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_vfs_sleep`.
    pub fn sleep(&mut self, vfs_id: u32, micros: i32) -> Result<i32> {
        let vfs = self.backend(vfs_id)?;
        trace!(vfs_id, micros, "vfs.sleep");
        let outcome = vfs.sleep(u64::try_from(micros).unwrap_or(0));
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_vfs_current_time`.
    pub fn current_time(&mut self, mem: &mut [u8], vfs_id: u32, p_time_out: Ptr) -> Result<i32> {
        let vfs = self.backend(vfs_id)?;
        let outcome = vfs
            .current_time()
            .and_then(|now| memory::write_f64(mem, p_time_out, now));
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_vfs_get_last_error`: copies the last recorded message
    /// (truncated to fit) and returns its code.
    pub fn get_last_error(&mut self, mem: &mut [u8], vfs_id: u32, n_byte: i32, z_out: Ptr) -> Result<i32> {
        let (code, message) = match self.last_errors.get(&vfs_id) {
            Some(err) => (err.effective_code(), err.message().unwrap_or_default()),
            None => (codes::OK, ""),
        };
        let capacity = usize::try_from(n_byte).unwrap_or(0);
        if z_out != 0 {
            memory::write_truncated_str(mem, z_out, capacity, message)?;
        }
        Ok(code)
    }

    fn file(&mut self, file_id: i32) -> Result<&mut Box<dyn VfsFile>> {
        self.files.must_get_mut(file_id as u32)
    }

    fn with_file(
        &mut self,
        vfs_id: u32,
        file_id: i32,
        op: impl FnOnce(&mut dyn VfsFile) -> Result<()>,
    ) -> Result<i32> {
        let file = self.file(file_id)?;
        let outcome = op(file.as_mut());
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_io_close`. The handle is released even if close fails.
    pub fn close(&mut self, vfs_id: u32, file_id: i32) -> Result<i32> {
        let mut file = self.files.must_remove(file_id as u32)?;
        trace!(vfs_id, file_id, "io.close");
        let outcome = file.close();
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_io_read`.
    pub fn read(
        &mut self,
        mem: &mut [u8],
        vfs_id: u32,
        file_id: i32,
        p_buf: Ptr,
        amount: i32,
        offset: i64,
    ) -> Result<i32> {
        self.counters.reads += 1;
        let file = self.file(file_id)?;
        let len = usize::try_from(amount)
            .map_err(|_| Error::abi(format!("negative read length {amount}")))?;
        let buf = memory::bytes_mut(mem, p_buf, len)?;
        trace!(vfs_id, file_id, len, offset, "io.read");
        let outcome = match u64::try_from(offset) {
            Ok(offset) => file.read(buf, offset),
            Err(_) => Err(super::ioerr(codes::IOERR_READ, format!("negative offset {offset}"))),
        };
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_io_write`.
    pub fn write(
        &mut self,
        mem: &[u8],
        vfs_id: u32,
        file_id: i32,
        p_buf: Ptr,
        amount: i32,
        offset: i64,
    ) -> Result<i32> {
        self.counters.writes += 1;
        let file = self.file(file_id)?;
        let len = usize::try_from(amount)
            .map_err(|_| Error::abi(format!("negative write length {amount}")))?;
        let buf = memory::bytes(mem, p_buf, len)?;
        trace!(vfs_id, file_id, len, offset, "io.write");
        let outcome = match u64::try_from(offset) {
            Ok(offset) => file.write(buf, offset),
            Err(_) => Err(super::ioerr(codes::IOERR_WRITE, format!("negative offset {offset}"))),
        };
        self.settle(vfs_id, outcome)
    }

    /// `sqlite3_wasm_io_truncate`.
    pub fn truncate(&mut self, vfs_id: u32, file_id: i32, size: i64) -> Result<i32> {
        trace!(vfs_id, file_id, size, "io.truncate");
        self.with_file(vfs_id, file_id, |file| match u64::try_from(size) {
            Ok(size) => file.truncate(size),
            Err(_) => Err(super::ioerr(codes::IOERR_TRUNCATE, format!("negative size {size}"))),
        })
    }

    /// `sqlite3_wasm_io_sync`.
    pub fn sync(&mut self, vfs_id: u32, file_id: i32, flags: i32) -> Result<i32> {
        trace!(vfs_id, file_id, flags, "io.sync");
        self.with_file(vfs_id, file_id, |file| file.sync(flags))
    }

    /// `sqlite3_wasm_io_file_size`.
    pub fn file_size(&mut self, mem: &mut [u8], vfs_id: u32, file_id: i32, p_size: Ptr) -> Result<i32> {
        trace!(vfs_id, file_id, "io.file_size");
        self.with_file(vfs_id, file_id, |file| {
            let size = file.file_size()?;
            let size = i64::try_from(size)
                .map_err(|_| super::ioerr(codes::IOERR_FSTAT, format!("size {size} overflows")))?;
            memory::write_i64(mem, p_size, size)
        })
    }

    /// `sqlite3_wasm_io_lock`.
    pub fn lock(&mut self, vfs_id: u32, file_id: i32, level: i32) -> Result<i32> {
        let level = lock_level(level)?;
        trace!(vfs_id, file_id, ?level, "io.lock");
        self.with_file(vfs_id, file_id, |file| file.lock(level))
    }

    /// `sqlite3_wasm_io_unlock`.
    pub fn unlock(&mut self, vfs_id: u32, file_id: i32, level: i32) -> Result<i32> {
        let level = lock_level(level)?;
        trace!(vfs_id, file_id, ?level, "io.unlock");
        self.with_file(vfs_id, file_id, |file| file.unlock(level))
    }

    /// `sqlite3_wasm_io_check_reserved_lock`.
    pub fn check_reserved_lock(
        &mut self,
        mem: &mut [u8],
        vfs_id: u32,
        file_id: i32,
        p_res_out: Ptr,
    ) -> Result<i32> {
        self.with_file(vfs_id, file_id, |file| {
            let held = file.check_reserved_lock()?;
            memory::write_bool(mem, p_res_out, held)
        })
    }

    /// `sqlite3_wasm_io_file_control`.
    pub fn file_control(&mut self, vfs_id: u32, file_id: i32, op: i32, p_arg: Ptr) -> Result<i32> {
        trace!(vfs_id, file_id, op, "io.file_control");
        self.with_file(vfs_id, file_id, |file| file.file_control(op, p_arg))
    }

    /// `sqlite3_wasm_io_sector_size`.
    pub fn sector_size(&mut self, file_id: i32) -> Result<i32> {
        Ok(self.file(file_id)?.sector_size())
    }

    /// `sqlite3_wasm_io_device_characteristics`.
    pub fn device_characteristics(&mut self, file_id: i32) -> Result<i32> {
        Ok(self.file(file_id)?.device_characteristics())
    }

    /// Closes every open file. Used when the engine instance is torn down.
    pub fn close_all(&mut self) {
        for (file_id, mut file) in self.files.drain() {
            if let Err(err) = file.close() {
                tracing::warn!(file_id, error = %err, "closing leaked file failed");
            }
        }
    }
}

fn lock_level(raw: i32) -> Result<LockLevel> {
    LockLevel::try_from(raw).map_err(|raw| Error::abi(format!("unknown lock level {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// In-memory backend recording what it was asked to do.
    #[derive(Default)]
    struct Scripted {
        files: Arc<Mutex<FxHashMap<String, Vec<u8>>>>,
    }

    struct ScriptedFile {
        data: Vec<u8>,
        flags: OpenFlags,
        lock: LockLevel,
    }

    impl Vfs for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn open(&self, path: Option<&str>, flags: OpenFlags) -> Result<Box<dyn VfsFile>> {
            let path = path.unwrap_or("<temp>");
            let data = match self.files.lock().get(path) {
                Some(data) => data.clone(),
                None if flags.contains(OpenFlags::CREATE) => Vec::new(),
                None => return Err(SqliteError::with_message(codes::CANTOPEN, path).into()),
            };
            Ok(Box::new(ScriptedFile {
                data,
                flags,
                lock: LockLevel::None,
            }))
        }

        fn delete(&self, path: &str, _sync_dir: bool) -> Result<()> {
            self.files
                .lock()
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| SqliteError::new(codes::IOERR_DELETE_NOENT).into())
        }

        fn access(&self, path: &str, _flag: AccessFlag) -> Result<bool> {
            Ok(self.files.lock().contains_key(path))
        }

        fn full_pathname(&self, path: &str) -> Result<String> {
            Ok(format!("/db/{path}"))
        }

        fn randomness(&self, buf: &mut [u8]) -> Result<()> {
            buf.fill(0x42);
            Ok(())
        }

        fn current_time(&self) -> Result<f64> {
            Ok(2_460_000.5)
        }
    }

    impl VfsFile for ScriptedFile {
        fn open_flags(&self) -> OpenFlags {
            self.flags
        }

        fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
            buf.fill(0);
            let start = (offset as usize).min(self.data.len());
            let end = (start + buf.len()).min(self.data.len());
            buf[..end - start].copy_from_slice(&self.data[start..end]);
            if end - start < buf.len() {
                return Err(SqliteError::new(codes::IOERR_SHORT_READ).into());
            }
            Ok(())
        }

        fn write(&mut self, buf: &[u8], offset: u64) -> Result<()> {
            let end = offset as usize + buf.len();
            if self.data.len() < end {
                self.data.resize(end, 0);
            }
            self.data[offset as usize..end].copy_from_slice(buf);
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self, _flags: i32) -> Result<()> {
            Ok(())
        }

        fn file_size(&mut self) -> Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn lock(&mut self, level: LockLevel) -> Result<()> {
            self.lock = level;
            Ok(())
        }

        fn unlock(&mut self, level: LockLevel) -> Result<()> {
            self.lock = level;
            Ok(())
        }

        fn check_reserved_lock(&mut self) -> Result<bool> {
            Ok(self.lock >= LockLevel::Reserved)
        }

        fn sector_size(&self) -> i32 {
            4096
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    const VFS_ID: u32 = 0x1000;
    const NAME: Ptr = 64;
    const OUT_A: Ptr = 128;
    const OUT_B: Ptr = 136;
    const BUF: Ptr = 256;

    fn host_with(vfs: Scripted) -> (VfsHost, Vec<u8>) {
        let mut host = VfsHost::new();
        host.bind_backend(VFS_ID, Arc::new(vfs));
        (host, vec![0u8; 1024])
    }

    fn open_file(host: &mut VfsHost, mem: &mut [u8], path: &str, flags: OpenFlags) -> i32 {
        memory::write_bounded_str(mem, NAME, 32, path).unwrap();
        let rc = host
            .open(mem, VFS_ID, NAME, OUT_A, flags.bits(), OUT_B)
            .unwrap();
        assert_eq!(rc, codes::OK);
        memory::read_u32(mem, OUT_A).unwrap() as i32
    }

    #[test]
    fn open_writes_file_id_and_flags() {
        let (mut host, mut mem) = host_with(Scripted::default());
        let flags = OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::MAIN_DB;
        let first = open_file(&mut host, &mut mem, "a.db", flags);
        assert_eq!(first, 1);
        assert_eq!(memory::read_u32(&mem, OUT_B).unwrap() as i32, flags.bits());
        let second = open_file(&mut host, &mut mem, "b.db", flags);
        assert_eq!(second, 2);
        assert_eq!(host.open_files(), 2);
    }

    #[test]
    fn failed_open_leaves_out_params_alone() {
        let (mut host, mut mem) = host_with(Scripted::default());
        memory::write_bounded_str(&mut mem, NAME, 32, "missing.db").unwrap();
        memory::write_u32(&mut mem, OUT_A, 0xdead).unwrap();
        let rc = host
            .open(&mut mem, VFS_ID, NAME, OUT_A, OpenFlags::READONLY.bits(), OUT_B)
            .unwrap();
        assert_eq!(rc, codes::CANTOPEN);
        assert_eq!(memory::read_u32(&mem, OUT_A).unwrap(), 0xdead);
        assert_eq!(host.open_files(), 0);

        let rc = host.get_last_error(&mut mem, VFS_ID, 64, BUF).unwrap();
        assert_eq!(rc, codes::CANTOPEN);
        assert_eq!(memory::read_cstr(&mem, BUF).unwrap(), "missing.db");
    }

    #[test]
    fn short_read_zero_fills_and_counts() {
        let (mut host, mut mem) = host_with(Scripted::default());
        let flags = OpenFlags::READWRITE | OpenFlags::CREATE;
        let file = open_file(&mut host, &mut mem, "a.db", flags);

        mem[BUF as usize..BUF as usize + 4].copy_from_slice(b"abcd");
        assert_eq!(host.write(&mem, VFS_ID, file, BUF, 4, 0).unwrap(), codes::OK);

        mem[BUF as usize..BUF as usize + 8].fill(0xff);
        let rc = host.read(&mut mem, VFS_ID, file, BUF, 8, 2).unwrap();
        assert_eq!(rc, codes::IOERR_SHORT_READ);
        assert_eq!(&mem[BUF as usize..BUF as usize + 8], b"cd\0\0\0\0\0\0");

        assert_eq!(host.counters(), IoCounters { reads: 1, writes: 1 });
    }

    #[test]
    fn file_size_and_truncate() {
        let (mut host, mut mem) = host_with(Scripted::default());
        let file = open_file(&mut host, &mut mem, "a.db", OpenFlags::READWRITE | OpenFlags::CREATE);
        mem[BUF as usize..BUF as usize + 16].fill(7);
        host.write(&mem, VFS_ID, file, BUF, 16, 0).unwrap();
        host.truncate(VFS_ID, file, 10).unwrap();
        assert_eq!(host.file_size(&mut mem, VFS_ID, file, OUT_A).unwrap(), codes::OK);
        assert_eq!(memory::read_i64(&mem, OUT_A).unwrap(), 10);
        assert_eq!(host.sector_size(file).unwrap(), 4096);
    }

    #[test]
    fn lock_state_is_visible_through_check_reserved_lock() {
        let (mut host, mut mem) = host_with(Scripted::default());
        let file = open_file(&mut host, &mut mem, "a.db", OpenFlags::READWRITE | OpenFlags::CREATE);
        host.lock(VFS_ID, file, 2).unwrap();
        host.check_reserved_lock(&mut mem, VFS_ID, file, OUT_A).unwrap();
        assert_eq!(memory::read_u32(&mem, OUT_A).unwrap(), 1);
        host.unlock(VFS_ID, file, 1).unwrap();
        host.check_reserved_lock(&mut mem, VFS_ID, file, OUT_A).unwrap();
        assert_eq!(memory::read_u32(&mem, OUT_A).unwrap(), 0);
        assert!(matches!(host.lock(VFS_ID, file, 9), Err(Error::AbiViolation(_))));
    }

    #[test]
    fn file_control_defaults_to_notfound() {
        let (mut host, mut mem) = host_with(Scripted::default());
        let file = open_file(&mut host, &mut mem, "a.db", OpenFlags::READWRITE | OpenFlags::CREATE);
        assert_eq!(host.file_control(VFS_ID, file, 18, 0).unwrap(), codes::NOTFOUND);
    }

    #[test]
    fn closed_files_become_violations() {
        let (mut host, mut mem) = host_with(Scripted::default());
        let file = open_file(&mut host, &mut mem, "a.db", OpenFlags::READWRITE | OpenFlags::CREATE);
        assert_eq!(host.close(VFS_ID, file).unwrap(), codes::OK);
        assert!(matches!(host.sync(VFS_ID, file, 2), Err(Error::AbiViolation(_))));
        assert!(matches!(host.close(VFS_ID, file), Err(Error::AbiViolation(_))));
    }

    #[test]
    fn backend_calls_write_out_params() {
        let vfs = Scripted::default();
        vfs.files.lock().insert("present".into(), vec![1]);
        let (mut host, mut mem) = host_with(vfs);

        memory::write_bounded_str(&mut mem, NAME, 32, "present").unwrap();
        host.access(&mut mem, VFS_ID, NAME, 0, OUT_A).unwrap();
        assert_eq!(memory::read_u32(&mem, OUT_A).unwrap(), 1);

        host.full_pathname(&mut mem, VFS_ID, NAME, 64, BUF).unwrap();
        assert_eq!(memory::read_cstr(&mem, BUF).unwrap(), "/db/present");
        let rc = host.full_pathname(&mut mem, VFS_ID, NAME, 8, BUF).unwrap();
        assert_eq!(rc, codes::TOOBIG);

        host.randomness(&mut mem, VFS_ID, 4, BUF).unwrap();
        assert_eq!(&mem[BUF as usize..BUF as usize + 4], &[0x42; 4]);

        host.current_time(&mut mem, VFS_ID, OUT_A).unwrap();
        assert_eq!(memory::read_f64(&mem, OUT_A).unwrap(), 2_460_000.5);

        assert_eq!(host.delete(&mem, VFS_ID, NAME, 1).unwrap(), codes::OK);
        assert_eq!(
            host.delete(&mem, VFS_ID, NAME, 1).unwrap(),
            codes::IOERR_DELETE_NOENT
        );
    }

    #[test]
    fn unbound_backends_are_violations() {
        let (mut host, mut mem) = host_with(Scripted::default());
        let vfs = host.unbind_backend(VFS_ID).unwrap();
        assert_eq!(host.backend_id(&vfs), None);
        assert!(matches!(host.sleep(VFS_ID, 1), Err(Error::AbiViolation(_))));
        assert!(matches!(
            host.current_time(&mut mem, VFS_ID, OUT_A),
            Err(Error::AbiViolation(_))
        ));
    }

    #[test]
    fn out_of_bounds_buffers_trap() {
        let (mut host, mut mem) = host_with(Scripted::default());
        let file = open_file(&mut host, &mut mem, "a.db", OpenFlags::READWRITE | OpenFlags::CREATE);
        assert!(matches!(
            host.read(&mut mem, VFS_ID, file, 1020, 16, 0),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
