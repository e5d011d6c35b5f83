//! Storage capability bridge.
//!
//! The engine routes every storage operation through the `sqlite3_wasm_vfs_*`
//! and `sqlite3_wasm_io_*` imports. [`VfsHost`] owns the backend and file
//! tables and turns those calls into calls on a registered [`Vfs`] or an
//! open [`VfsFile`], writing out-parameters back into engine memory.

mod dispatch;
mod local;
mod memory;
#[cfg(feature = "remote")]
mod remote;

use std::time::Duration;

use rand::RngCore;

pub use dispatch::{IoCounters, VfsHost};
pub use local::LocalVfs;
pub use memory::MemoryOnlyVfs;
#[cfg(feature = "remote")]
pub use remote::{HttpRangeSource, RangeSource, RemoteVfs};

use crate::types::{constants::codes, AccessFlag, LockLevel, OpenFlags, Result, SqliteError};

/// Julian day number of the Unix epoch.
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;
const NANOS_PER_DAY: f64 = 86_400e9;

/// A storage backend.
///
/// `randomness`, `sleep` and `current_time` have working defaults, so a
/// backend only has to supply the filesystem half.
pub trait Vfs: Send + Sync {
    /// Name the backend is registered under.
    fn name(&self) -> &str;

    /// Opens `path`; `None` asks for an anonymous temporary file.
    fn open(&self, path: Option<&str>, flags: OpenFlags) -> Result<Box<dyn VfsFile>>;

    /// Removes `path`.
    fn delete(&self, path: &str, sync_dir: bool) -> Result<()>;

    /// Answers an existence/permission question about `path`.
    fn access(&self, path: &str, flag: AccessFlag) -> Result<bool>;

    /// Canonicalizes `path`.
    fn full_pathname(&self, path: &str) -> Result<String>;

    /// Fills `buf` with random bytes.
    fn randomness(&self, buf: &mut [u8]) -> Result<()> {
        rand::thread_rng().fill_bytes(buf);
        Ok(())
    }

    /// Blocks the calling thread.
    fn sleep(&self, micros: u64) -> Result<()> {
        std::thread::sleep(Duration::from_micros(micros));
        Ok(())
    }

    /// Current time as a Julian day number.
    fn current_time(&self) -> Result<f64> {
        Ok(julian_day_now())
    }
}

/// A file handle returned by [`Vfs::open`].
pub trait VfsFile: Send {
    /// Flags the file was actually opened with.
    fn open_flags(&self) -> OpenFlags;

    /// Fills `buf` from `offset`.
    ///
    /// Fewer bytes than requested must zero-fill the rest and fail with
    /// `IOERR_SHORT_READ`.
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Writes all of `buf` at `offset`.
    fn write(&mut self, buf: &[u8], offset: u64) -> Result<()>;

    /// Truncates to `len` bytes.
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Flushes to stable storage.
    fn sync(&mut self, flags: i32) -> Result<()>;

    /// Current size in bytes.
    fn file_size(&mut self) -> Result<u64>;

    /// Raises the lock to `level`.
    fn lock(&mut self, level: LockLevel) -> Result<()>;

    /// Lowers the lock to `level`.
    fn unlock(&mut self, level: LockLevel) -> Result<()>;

    /// Whether any connection holds a RESERVED or stronger lock.
    fn check_reserved_lock(&mut self) -> Result<bool>;

    /// Handles a file-control opcode. `arg` is an engine pointer.
    fn file_control(&mut self, op: i32, arg: u32) -> Result<()> {
        let _ = (op, arg);
        Err(SqliteError::new(codes::NOTFOUND).into())
    }

    /// Sector size in bytes; 0 lets the engine pick its default.
    fn sector_size(&self) -> i32 {
        0
    }

    /// `iocap` bits.
    fn device_characteristics(&self) -> i32 {
        0
    }

    /// Releases the handle.
    fn close(&mut self) -> Result<()>;
}

/// Current time as a Julian day number.
pub fn julian_day_now() -> f64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    nanos as f64 / NANOS_PER_DAY + UNIX_EPOCH_JULIAN_DAY
}

fn ioerr(code: i32, message: impl Into<String>) -> crate::types::Error {
    SqliteError::with_message(code, message).into()
}
