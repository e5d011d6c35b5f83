use std::{
    fs::{self, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};

use super::{ioerr, Vfs, VfsFile};
use crate::primitives::io::PositionedFile;
use crate::types::{
    constants::{codes, sync_flags},
    AccessFlag, Error, LockLevel, OpenFlags, Result,
};

/// Backend over the host filesystem.
#[derive(Debug, Clone)]
pub struct LocalVfs {
    name: String,
    root: Option<PathBuf>,
}

impl LocalVfs {
    /// Registration name.
    pub const NAME: &'static str = "local";

    /// Backend resolving relative paths against the process working directory.
    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_owned(),
            root: None,
        }
    }

    /// Backend resolving relative paths against `root`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            name: Self::NAME.to_owned(),
            root: Some(root.into()),
        }
    }

    /// Same backend under another name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let path = Path::new(path);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        match &self.root {
            Some(root) => Ok(root.join(path)),
            None => Ok(std::env::current_dir()?.join(path)),
        }
    }
}

impl Default for LocalVfs {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(code: i32, context: &str, err: io::Error) -> Error {
    ioerr(code, format!("{context}: {err}"))
}

impl Vfs for LocalVfs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: Option<&str>, flags: OpenFlags) -> Result<Box<dyn VfsFile>> {
        let Some(path) = path else {
            let file = tempfile::tempfile()
                .map_err(|err| io_error(codes::CANTOPEN, "temporary file", err))?;
            return Ok(Box::new(LocalFile::new(PositionedFile::new(file), flags, None)));
        };
        let resolved = self
            .resolve(path)
            .map_err(|err| io_error(codes::CANTOPEN, path, err))?;

        let writable = flags.contains(OpenFlags::READWRITE);
        let create = flags.contains(OpenFlags::CREATE);
        let mut options = OpenOptions::new();
        options.read(true).write(writable);
        if create && flags.contains(OpenFlags::EXCLUSIVE) {
            options.create_new(true);
        } else if create {
            options.create(true);
        }

        let (file, flags) = match options.open(&resolved) {
            Ok(file) => (file, flags),
            // Read-write on a read-only file degrades to read-only.
            Err(err) if writable && !create && err.kind() == ErrorKind::PermissionDenied => {
                let file = OpenOptions::new()
                    .read(true)
                    .open(&resolved)
                    .map_err(|err| io_error(codes::CANTOPEN, path, err))?;
                let degraded = OpenFlags(
                    (flags.bits() & !OpenFlags::READWRITE.bits()) | OpenFlags::READONLY.bits(),
                );
                (file, degraded)
            }
            Err(err) => return Err(io_error(codes::CANTOPEN, path, err)),
        };
        debug!(path = %resolved.display(), flags = flags.bits(), "local.open");
        let delete_on_close = flags
            .contains(OpenFlags::DELETEONCLOSE)
            .then_some(resolved);
        Ok(Box::new(LocalFile::new(
            PositionedFile::new(file),
            flags,
            delete_on_close,
        )))
    }

    fn delete(&self, path: &str, sync_dir: bool) -> Result<()> {
        let resolved = self
            .resolve(path)
            .map_err(|err| io_error(codes::IOERR_DELETE, path, err))?;
        match fs::remove_file(&resolved) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(io_error(codes::IOERR_DELETE_NOENT, path, err));
            }
            Err(err) => return Err(io_error(codes::IOERR_DELETE, path, err)),
        }
        if sync_dir {
            sync_parent(&resolved);
        }
        Ok(())
    }

    fn access(&self, path: &str, flag: AccessFlag) -> Result<bool> {
        let resolved = self
            .resolve(path)
            .map_err(|err| io_error(codes::IOERR_ACCESS, path, err))?;
        let meta = match fs::metadata(&resolved) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(io_error(codes::IOERR_ACCESS, path, err)),
        };
        Ok(match flag {
            AccessFlag::Exists | AccessFlag::Read => true,
            AccessFlag::ReadWrite => !meta.permissions().readonly(),
        })
    }

    fn full_pathname(&self, path: &str) -> Result<String> {
        let resolved = self
            .resolve(path)
            .map_err(|err| io_error(codes::CANTOPEN_FULLPATH, path, err))?;
        resolved.into_os_string().into_string().map_err(|raw| {
            ioerr(
                codes::CANTOPEN_FULLPATH,
                format!("{} is not valid UTF-8", Path::new(&raw).display()),
            )
        })
    }

    fn randomness(&self, buf: &mut [u8]) -> Result<()> {
        OsRng.fill_bytes(buf);
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    if let Err(err) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!(dir = %parent.display(), error = %err, "directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// An open file of [`LocalVfs`].
#[derive(Debug)]
struct LocalFile {
    file: Option<PositionedFile>,
    flags: OpenFlags,
    delete_on_close: Option<PathBuf>,
    lock: LockLevel,
}

impl LocalFile {
    fn new(file: PositionedFile, flags: OpenFlags, delete_on_close: Option<PathBuf>) -> Self {
        Self {
            file: Some(file),
            flags,
            delete_on_close,
            lock: LockLevel::None,
        }
    }

    fn handle(&self) -> Result<&PositionedFile> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::misuse("file already closed"))
    }
}

impl VfsFile for LocalFile {
    fn open_flags(&self) -> OpenFlags {
        self.flags
    }

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        let read = self
            .handle()?
            .read_at(offset, buf)
            .map_err(|err| io_error(codes::IOERR_READ, "read", err))?;
        if read < buf.len() {
            buf[read..].fill(0);
            return Err(ioerr(
                codes::IOERR_SHORT_READ,
                format!("read {read} of {} bytes at {offset}", buf.len()),
            ));
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.handle()?
            .write_at(offset, buf)
            .map_err(|err| io_error(codes::IOERR_WRITE, "write", err))
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.handle()?
            .set_len(len)
            .map_err(|err| io_error(codes::IOERR_TRUNCATE, "truncate", err))
    }

    fn sync(&mut self, flags: i32) -> Result<()> {
        let data_only = flags & sync_flags::DATAONLY != 0;
        self.handle()?
            .sync(data_only)
            .map_err(|err| io_error(codes::IOERR_FSYNC, "sync", err))
    }

    /// Flushes before measuring, whatever the open mode.
    fn file_size(&mut self) -> Result<u64> {
        let file = self.handle()?;
        file.sync(false)
            .map_err(|err| io_error(codes::IOERR_FSYNC, "sync", err))?;
        file.len()
            .map_err(|err| io_error(codes::IOERR_FSTAT, "stat", err))
    }

    fn lock(&mut self, level: LockLevel) -> Result<()> {
        if level > self.lock {
            self.lock = level;
        }
        Ok(())
    }

    fn unlock(&mut self, level: LockLevel) -> Result<()> {
        if level < self.lock {
            self.lock = level;
        }
        Ok(())
    }

    fn check_reserved_lock(&mut self) -> Result<bool> {
        Ok(self.lock >= LockLevel::Reserved)
    }

    fn close(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        file.sync(false)
            .map_err(|err| io_error(codes::IOERR_FSYNC, "sync", err))?;
        drop(file);
        if let Some(path) = self.delete_on_close.take() {
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != ErrorKind::NotFound {
                    return Err(io_error(codes::IOERR_DELETE, "delete on close", err));
                }
            }
        }
        Ok(())
    }
}

impl Drop for LocalFile {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(err) = self.close() {
                warn!(error = %err, "closing leaked local file failed");
            }
        }
    }
}
