use crate::types::OpenFlags;

/// How [`Sqlite::open`](crate::Sqlite::open) opens a connection.
///
/// With neither flags nor a backend name the plain `sqlite3_open` path is
/// used (read-write, create, default backend).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Explicit `sqlite3_open_v2` flags.
    pub flags: Option<OpenFlags>,
    /// Name of a registered backend.
    pub vfs: Option<String>,
}

impl OpenOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags used when a backend is named but no flags are.
    pub fn default_flags() -> OpenFlags {
        OpenFlags::READWRITE | OpenFlags::CREATE
    }

    /// Sets explicit open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Read-only, failing if the database does not exist.
    pub fn read_only(self) -> Self {
        self.flags(OpenFlags::READONLY)
    }

    /// Read-write, failing if the database does not exist.
    pub fn read_write(self) -> Self {
        self.flags(OpenFlags::READWRITE)
    }

    /// Routes the connection through the backend registered as `name`.
    pub fn vfs(mut self, name: impl Into<String>) -> Self {
        self.vfs = Some(name.into());
        self
    }
}
