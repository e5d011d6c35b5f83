#![forbid(unsafe_code)]

use std::{
    fs::{File, Metadata},
    io,
};

use tracing::trace;

#[cfg(unix)]
/// Positioned I/O over POSIX `pread`/`pwrite`.
pub mod pos_unix {
    use std::{
        fs::File,
        io::{self, ErrorKind},
        os::unix::fs::FileExt,
    };

    /// Reads into `dst` at `off` until it is full or EOF is reached.
    ///
    /// Returns the number of bytes read.
    pub fn read_full(file: &File, mut off: u64, dst: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < dst.len() {
            match file.read_at(&mut dst[filled..], off) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    off += n as u64;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }

    /// Writes all of `src` at `off`.
    pub fn write_all(file: &File, off: u64, src: &[u8]) -> io::Result<()> {
        file.write_all_at(src, off)
    }
}

#[cfg(windows)]
/// Positioned I/O over `seek_read`/`seek_write`.
pub mod pos_win {
    use std::{
        fs::File,
        io::{self, ErrorKind},
        os::windows::fs::FileExt,
    };

    /// Reads into `dst` at `off` until it is full or EOF is reached.
    pub fn read_full(file: &File, mut off: u64, dst: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < dst.len() {
            match file.seek_read(&mut dst[filled..], off) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    off += n as u64;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }

    /// Writes all of `src` at `off`.
    pub fn write_all(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
        while !src.is_empty() {
            let written = file.seek_write(src, off)?;
            if written == 0 {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "seek_write wrote zero bytes",
                ));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }
}

/// A file accessed only through absolute offsets.
#[derive(Debug)]
pub struct PositionedFile {
    file: File,
}

impl PositionedFile {
    /// Wraps an open file.
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Reads at `off` until `dst` is full or EOF; returns the bytes read.
    pub fn read_at(&self, off: u64, dst: &mut [u8]) -> io::Result<usize> {
        trace!(off, len = dst.len(), "io.read_at");
        #[cfg(unix)]
        {
            pos_unix::read_full(&self.file, off, dst)
        }
        #[cfg(windows)]
        {
            pos_win::read_full(&self.file, off, dst)
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = (off, dst);
            Err(unsupported())
        }
    }

    /// Writes all of `src` at `off`, extending the file as needed.
    pub fn write_at(&self, off: u64, src: &[u8]) -> io::Result<()> {
        trace!(off, len = src.len(), "io.write_at");
        #[cfg(unix)]
        {
            pos_unix::write_all(&self.file, off, src)
        }
        #[cfg(windows)]
        {
            pos_win::write_all(&self.file, off, src)
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = (off, src);
            Err(unsupported())
        }
    }

    /// Flushes file data, and metadata unless `data_only`.
    pub fn sync(&self, data_only: bool) -> io::Result<()> {
        trace!(data_only, "io.sync");
        if data_only {
            self.file.sync_data()
        } else {
            self.file.sync_all()
        }
    }

    /// Current length in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    /// Returns true if the file is empty.
    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncates or extends to `len` bytes.
    pub fn set_len(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    /// File metadata.
    pub fn metadata(&self) -> io::Result<Metadata> {
        self.file.metadata()
    }
}

#[cfg(not(any(unix, windows)))]
fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "positioned I/O unsupported on this platform",
    )
}
