use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{ioerr, Vfs, VfsFile};
use crate::types::{constants::codes, AccessFlag, OpenFlags, Result};

/// Fallback backend that has no filesystem at all.
///
/// Every file operation fails with IOERR; only randomness, sleep and the
/// clock work. The engine registers it during OS initialization so that
/// `:memory:` databases and time functions work without any other backend.
pub struct MemoryOnlyVfs {
    name: String,
    rng: Option<Mutex<ChaCha8Rng>>,
}

impl MemoryOnlyVfs {
    /// Registration name.
    pub const NAME: &'static str = "memory";

    /// Backend drawing randomness from the thread RNG.
    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_owned(),
            rng: None,
        }
    }

    /// Backend whose randomness is reproducible from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            name: Self::NAME.to_owned(),
            rng: Some(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Same backend under another name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for MemoryOnlyVfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for MemoryOnlyVfs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: Option<&str>, _flags: OpenFlags) -> Result<Box<dyn VfsFile>> {
        Err(ioerr(
            codes::IOERR,
            format!("{} has no files: {}", self.name, path.unwrap_or("<temp>")),
        ))
    }

    fn delete(&self, path: &str, _sync_dir: bool) -> Result<()> {
        Err(ioerr(codes::IOERR, format!("{} has no files: {path}", self.name)))
    }

    fn access(&self, path: &str, _flag: AccessFlag) -> Result<bool> {
        Err(ioerr(codes::IOERR, format!("{} has no files: {path}", self.name)))
    }

    fn full_pathname(&self, path: &str) -> Result<String> {
        Err(ioerr(codes::IOERR, format!("{} has no files: {path}", self.name)))
    }

    fn randomness(&self, buf: &mut [u8]) -> Result<()> {
        match &self.rng {
            Some(rng) => rng.lock().fill_bytes(buf),
            None => rand::thread_rng().fill_bytes(buf),
        }
        Ok(())
    }
}
