use std::{io::Read, num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::{ioerr, Vfs, VfsFile};
use crate::types::{constants::codes, AccessFlag, LockLevel, OpenFlags, Result};

const DEFAULT_BLOCK_CACHE: usize = 64;

/// Ranged reads against a static resource.
pub trait RangeSource: Send + Sync {
    /// Size of the resource, or `None` when it does not exist.
    fn head(&self, url: &str) -> Result<Option<u64>>;

    /// Fetches up to `len` bytes starting at `offset`.
    ///
    /// Fails with `IOERR_READ` unless the server answered with a partial
    /// content response.
    fn get_range(&self, url: &str, offset: u64, len: usize) -> Result<Vec<u8>>;
}

/// [`RangeSource`] over HTTP `HEAD` and `Range` requests.
pub struct HttpRangeSource {
    agent: ureq::Agent,
}

impl HttpRangeSource {
    /// Source with a default agent.
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for HttpRangeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeSource for HttpRangeSource {
    fn head(&self, url: &str) -> Result<Option<u64>> {
        let resp = self
            .agent
            .head(url)
            .call()
            .map_err(|err| ioerr(codes::IOERR, format!("HEAD {url}: {err}")))?;
        let status: u16 = resp.status().into();
        trace!(url, status, "remote.head");
        if status != 200 {
            return Ok(None);
        }
        let len = resp
            .headers()
            .get("content-length")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| ioerr(codes::IOERR, format!("HEAD {url}: no Content-Length")))?;
        Ok(Some(len))
    }

    fn get_range(&self, url: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let last = offset + len as u64 - 1;
        let range = format!("bytes={offset}-{last}");
        let resp = self
            .agent
            .get(url)
            .header("Range", &range)
            .call()
            .map_err(|err| ioerr(codes::IOERR_READ, format!("GET {url} {range}: {err}")))?;
        let status: u16 = resp.status().into();
        trace!(url, status, range = %range, "remote.get_range");
        if status != 206 {
            return Err(ioerr(
                codes::IOERR_READ,
                format!("GET {url} {range}: status {status}"),
            ));
        }
        let mut body = Vec::with_capacity(len);
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| ioerr(codes::IOERR_READ, format!("GET {url} {range}: {err}")))?;
        body.truncate(len);
        Ok(body)
    }
}

/// Read-only backend over a [`RangeSource`].
///
/// Paths are resolved against `base` unless they are already absolute URLs.
/// The resource is assumed not to change while it is open.
pub struct RemoteVfs {
    name: String,
    base: String,
    source: Arc<dyn RangeSource>,
    exists: Mutex<FxHashMap<String, bool>>,
    block_cache: NonZeroUsize,
}

impl RemoteVfs {
    /// Registration name.
    pub const NAME: &'static str = "remote";

    /// Backend fetching over HTTP relative to `base`.
    pub fn http(base: impl Into<String>) -> Self {
        Self::with_source(base, Arc::new(HttpRangeSource::new()))
    }

    /// Backend over any range source.
    pub fn with_source(base: impl Into<String>, source: Arc<dyn RangeSource>) -> Self {
        Self {
            name: Self::NAME.to_owned(),
            base: base.into(),
            source,
            exists: Mutex::new(FxHashMap::default()),
            block_cache: NonZeroUsize::new(DEFAULT_BLOCK_CACHE).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Same backend under another name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Blocks kept per open file.
    pub fn with_block_cache(mut self, blocks: usize) -> Self {
        self.block_cache = NonZeroUsize::new(blocks).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Splits `path` into its absolute URL (query dropped) and `mode` parameter.
    fn resolve(&self, path: &str) -> (String, Option<String>) {
        let (location, query) = match path.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (path, None),
        };
        let mode = query.and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "mode")
                .map(|(_, value)| value.to_owned())
        });
        let url = if location.contains("://") {
            location.to_owned()
        } else {
            format!(
                "{}/{}",
                self.base.trim_end_matches('/'),
                location.trim_start_matches('/')
            )
        };
        (url, mode)
    }
}

impl Vfs for RemoteVfs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: Option<&str>, flags: OpenFlags) -> Result<Box<dyn VfsFile>> {
        let supported = OpenFlags::READONLY | OpenFlags::MAIN_DB | OpenFlags::URI;
        if flags.bits() & !supported.bits() != 0 {
            return Err(ioerr(
                codes::IOERR,
                format!("unsupported open flags {:#x}", flags.bits()),
            ));
        }
        let path = path.ok_or_else(|| ioerr(codes::IOERR, "temporary files are unsupported"))?;
        let (url, _) = self.resolve(path);
        debug!(url = %url, "remote.open");
        Ok(Box::new(RemoteFile {
            url,
            flags,
            source: Arc::clone(&self.source),
            size: None,
            blocks: LruCache::new(self.block_cache),
        }))
    }

    fn delete(&self, path: &str, _sync_dir: bool) -> Result<()> {
        Err(ioerr(codes::IOERR, format!("{path} is read-only")))
    }

    fn access(&self, path: &str, flag: AccessFlag) -> Result<bool> {
        let (url, mode) = self.resolve(path);
        if mode.as_deref().is_some_and(|mode| mode != "ro") {
            return Ok(false);
        }
        match flag {
            AccessFlag::Exists | AccessFlag::Read => {}
            AccessFlag::ReadWrite => return Ok(false),
        }
        if let Some(found) = self.exists.lock().get(&url) {
            return Ok(*found);
        }
        let found = self.source.head(&url)?.is_some();
        self.exists.lock().insert(url, found);
        Ok(found)
    }

    fn full_pathname(&self, path: &str) -> Result<String> {
        Ok(path.to_owned())
    }
}

struct RemoteFile {
    url: String,
    flags: OpenFlags,
    source: Arc<dyn RangeSource>,
    size: Option<u64>,
    blocks: LruCache<(u64, usize), Vec<u8>>,
}

impl RemoteFile {
    fn fetch(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if let Some(block) = self.blocks.get(&(offset, len)) {
            return Ok(block.clone());
        }
        let block = self.source.get_range(&self.url, offset, len)?;
        self.blocks.put((offset, len), block.clone());
        Ok(block)
    }
}

impl VfsFile for RemoteFile {
    fn open_flags(&self) -> OpenFlags {
        self.flags
    }

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        buf.fill(0);
        let size = self.file_size()?;
        let available = size.saturating_sub(offset).min(buf.len() as u64) as usize;
        let data = if available == 0 {
            Vec::new()
        } else {
            self.fetch(offset, available)?
        };
        let copied = data.len().min(buf.len());
        buf[..copied].copy_from_slice(&data[..copied]);
        if copied < buf.len() {
            return Err(ioerr(
                codes::IOERR_SHORT_READ,
                format!("read {copied} of {} bytes at {offset}", buf.len()),
            ));
        }
        Ok(())
    }

    fn write(&mut self, _buf: &[u8], _offset: u64) -> Result<()> {
        Err(ioerr(codes::IOERR, format!("{} is read-only", self.url)))
    }

    fn truncate(&mut self, _len: u64) -> Result<()> {
        Err(ioerr(codes::IOERR, format!("{} is read-only", self.url)))
    }

    fn sync(&mut self, _flags: i32) -> Result<()> {
        Ok(())
    }

    fn file_size(&mut self) -> Result<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = self
            .source
            .head(&self.url)?
            .ok_or_else(|| ioerr(codes::IOERR, format!("{} not found", self.url)))?;
        self.size = Some(size);
        Ok(size)
    }

    fn lock(&mut self, _level: LockLevel) -> Result<()> {
        Ok(())
    }

    fn unlock(&mut self, _level: LockLevel) -> Result<()> {
        Ok(())
    }

    fn check_reserved_lock(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn close(&mut self) -> Result<()> {
        self.blocks.clear();
        Ok(())
    }
}
