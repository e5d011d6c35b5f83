//! Integer constants shared with the engine build.
//!
//! These mirror the values compiled into the engine module. They are part of
//! the ABI: a module built against a different header is rejected at
//! initialization by the version check in [`crate::engine::Sqlite`].

/// Library version number the host was built against (`SQLITE_VERSION_NUMBER`).
pub const SQLITE_VERSION_NUMBER: i32 = 3_046_001;

/// Primary and extended result codes.
pub mod codes {
    #![allow(missing_docs)]

    pub const OK: i32 = 0;
    pub const ERROR: i32 = 1;
    pub const INTERNAL: i32 = 2;
    pub const PERM: i32 = 3;
    pub const ABORT: i32 = 4;
    pub const BUSY: i32 = 5;
    pub const LOCKED: i32 = 6;
    pub const NOMEM: i32 = 7;
    pub const READONLY: i32 = 8;
    pub const INTERRUPT: i32 = 9;
    pub const IOERR: i32 = 10;
    pub const CORRUPT: i32 = 11;
    pub const NOTFOUND: i32 = 12;
    pub const FULL: i32 = 13;
    pub const CANTOPEN: i32 = 14;
    pub const PROTOCOL: i32 = 15;
    pub const EMPTY: i32 = 16;
    pub const SCHEMA: i32 = 17;
    pub const TOOBIG: i32 = 18;
    pub const CONSTRAINT: i32 = 19;
    pub const MISMATCH: i32 = 20;
    pub const MISUSE: i32 = 21;
    pub const NOLFS: i32 = 22;
    pub const AUTH: i32 = 23;
    pub const FORMAT: i32 = 24;
    pub const RANGE: i32 = 25;
    pub const NOTADB: i32 = 26;
    pub const NOTICE: i32 = 27;
    pub const WARNING: i32 = 28;
    pub const ROW: i32 = 100;
    pub const DONE: i32 = 101;

    pub const IOERR_READ: i32 = IOERR | (1 << 8);
    pub const IOERR_SHORT_READ: i32 = IOERR | (2 << 8);
    pub const IOERR_WRITE: i32 = IOERR | (3 << 8);
    pub const IOERR_FSYNC: i32 = IOERR | (4 << 8);
    pub const IOERR_TRUNCATE: i32 = IOERR | (6 << 8);
    pub const IOERR_FSTAT: i32 = IOERR | (7 << 8);
    pub const IOERR_UNLOCK: i32 = IOERR | (8 << 8);
    pub const IOERR_DELETE: i32 = IOERR | (10 << 8);
    pub const IOERR_ACCESS: i32 = IOERR | (13 << 8);
    pub const IOERR_LOCK: i32 = IOERR | (15 << 8);
    pub const IOERR_CLOSE: i32 = IOERR | (16 << 8);
    pub const IOERR_DELETE_NOENT: i32 = IOERR | (23 << 8);
    pub const CANTOPEN_FULLPATH: i32 = CANTOPEN | (3 << 8);
    pub const CONSTRAINT_CHECK: i32 = CONSTRAINT | (1 << 8);
    pub const CONSTRAINT_NOTNULL: i32 = CONSTRAINT | (5 << 8);
    pub const CONSTRAINT_PRIMARYKEY: i32 = CONSTRAINT | (6 << 8);
    pub const CONSTRAINT_UNIQUE: i32 = CONSTRAINT | (8 << 8);

    /// Returns the symbolic name of a primary or extended result code.
    pub fn name(code: i32) -> Option<&'static str> {
        let name = match code {
            OK => "OK",
            ERROR => "ERROR",
            INTERNAL => "INTERNAL",
            PERM => "PERM",
            ABORT => "ABORT",
            BUSY => "BUSY",
            LOCKED => "LOCKED",
            NOMEM => "NOMEM",
            READONLY => "READONLY",
            INTERRUPT => "INTERRUPT",
            IOERR => "IOERR",
            CORRUPT => "CORRUPT",
            NOTFOUND => "NOTFOUND",
            FULL => "FULL",
            CANTOPEN => "CANTOPEN",
            PROTOCOL => "PROTOCOL",
            EMPTY => "EMPTY",
            SCHEMA => "SCHEMA",
            TOOBIG => "TOOBIG",
            CONSTRAINT => "CONSTRAINT",
            MISMATCH => "MISMATCH",
            MISUSE => "MISUSE",
            NOLFS => "NOLFS",
            AUTH => "AUTH",
            FORMAT => "FORMAT",
            RANGE => "RANGE",
            NOTADB => "NOTADB",
            NOTICE => "NOTICE",
            WARNING => "WARNING",
            ROW => "ROW",
            DONE => "DONE",
            IOERR_READ => "IOERR_READ",
            IOERR_SHORT_READ => "IOERR_SHORT_READ",
            IOERR_WRITE => "IOERR_WRITE",
            IOERR_FSYNC => "IOERR_FSYNC",
            IOERR_TRUNCATE => "IOERR_TRUNCATE",
            IOERR_FSTAT => "IOERR_FSTAT",
            IOERR_UNLOCK => "IOERR_UNLOCK",
            IOERR_DELETE => "IOERR_DELETE",
            IOERR_ACCESS => "IOERR_ACCESS",
            IOERR_LOCK => "IOERR_LOCK",
            IOERR_CLOSE => "IOERR_CLOSE",
            IOERR_DELETE_NOENT => "IOERR_DELETE_NOENT",
            CANTOPEN_FULLPATH => "CANTOPEN_FULLPATH",
            CONSTRAINT_CHECK => "CONSTRAINT_CHECK",
            CONSTRAINT_NOTNULL => "CONSTRAINT_NOTNULL",
            CONSTRAINT_PRIMARYKEY => "CONSTRAINT_PRIMARYKEY",
            CONSTRAINT_UNIQUE => "CONSTRAINT_UNIQUE",
            _ => return None,
        };
        Some(name)
    }

    /// Returns the primary code for a possibly extended code.
    pub fn primary(code: i32) -> i32 {
        code & 0xff
    }
}

/// Flags accepted by `sqlite3_open_v2` and by a backend's `open`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct OpenFlags(pub i32);

impl OpenFlags {
    /// Open read-only.
    pub const READONLY: OpenFlags = OpenFlags(0x0000_0001);
    /// Open for reading and writing.
    pub const READWRITE: OpenFlags = OpenFlags(0x0000_0002);
    /// Create the file if it does not exist.
    pub const CREATE: OpenFlags = OpenFlags(0x0000_0004);
    /// Remove the file once it is closed.
    pub const DELETEONCLOSE: OpenFlags = OpenFlags(0x0000_0008);
    /// Fail if the file already exists.
    pub const EXCLUSIVE: OpenFlags = OpenFlags(0x0000_0010);
    /// Interpret the filename as a URI.
    pub const URI: OpenFlags = OpenFlags(0x0000_0040);
    /// Open an in-memory database.
    pub const MEMORY: OpenFlags = OpenFlags(0x0000_0080);
    /// The file is a main database.
    pub const MAIN_DB: OpenFlags = OpenFlags(0x0000_0100);
    /// The file is a temporary database.
    pub const TEMP_DB: OpenFlags = OpenFlags(0x0000_0200);
    /// The file is a transient database.
    pub const TRANSIENT_DB: OpenFlags = OpenFlags(0x0000_0400);
    /// The file is a main rollback journal.
    pub const MAIN_JOURNAL: OpenFlags = OpenFlags(0x0000_0800);
    /// The file is a temporary journal.
    pub const TEMP_JOURNAL: OpenFlags = OpenFlags(0x0000_1000);
    /// The file is a statement subjournal.
    pub const SUBJOURNAL: OpenFlags = OpenFlags(0x0000_2000);
    /// The file is a super-journal.
    pub const SUPER_JOURNAL: OpenFlags = OpenFlags(0x0000_4000);
    /// Open the connection in multi-thread mode.
    pub const NOMUTEX: OpenFlags = OpenFlags(0x0000_8000);
    /// Open the connection in serialized mode.
    pub const FULLMUTEX: OpenFlags = OpenFlags(0x0001_0000);
    /// The file is a write-ahead log.
    pub const WAL: OpenFlags = OpenFlags(0x0008_0000);
    /// Report extended result codes.
    pub const EXRESCODE: OpenFlags = OpenFlags(0x0200_0000);

    /// Returns the raw flag bits.
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Returns true when every bit of `other` is set in `self`.
    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

/// Question asked by `xAccess`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AccessFlag {
    /// Does the path exist?
    Exists,
    /// Is the path readable and writable?
    ReadWrite,
    /// Is the path readable?
    Read,
}

impl TryFrom<i32> for AccessFlag {
    type Error = i32;

    fn try_from(raw: i32) -> std::result::Result<Self, i32> {
        match raw {
            0 => Ok(AccessFlag::Exists),
            1 => Ok(AccessFlag::ReadWrite),
            2 => Ok(AccessFlag::Read),
            other => Err(other),
        }
    }
}

/// File lock levels, ordered from weakest to strongest.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default)]
pub enum LockLevel {
    /// No lock held.
    #[default]
    None,
    /// Shared read lock.
    Shared,
    /// Reserved lock: intent to write.
    Reserved,
    /// Pending lock: waiting for readers to drain.
    Pending,
    /// Exclusive write lock.
    Exclusive,
}

impl TryFrom<i32> for LockLevel {
    type Error = i32;

    fn try_from(raw: i32) -> std::result::Result<Self, i32> {
        match raw {
            0 => Ok(LockLevel::None),
            1 => Ok(LockLevel::Shared),
            2 => Ok(LockLevel::Reserved),
            3 => Ok(LockLevel::Pending),
            4 => Ok(LockLevel::Exclusive),
            other => Err(other),
        }
    }
}

/// `xSync` flags.
pub mod sync_flags {
    /// Normal fsync.
    pub const NORMAL: i32 = 0x0002;
    /// Full fsync (F_FULLFSYNC where available).
    pub const FULL: i32 = 0x0003;
    /// Only file data needs to reach the disk.
    pub const DATAONLY: i32 = 0x0010;
}

/// `xDeviceCharacteristics` bits.
pub mod iocap {
    #![allow(missing_docs)]

    pub const ATOMIC: i32 = 0x0000_0001;
    pub const SAFE_APPEND: i32 = 0x0000_0200;
    pub const SEQUENTIAL: i32 = 0x0000_0400;
    pub const UNDELETABLE_WHEN_OPEN: i32 = 0x0000_0800;
    pub const POWERSAFE_OVERWRITE: i32 = 0x0000_1000;
    pub const IMMUTABLE: i32 = 0x0000_2000;
}

/// Datatype tags reported by `sqlite3_column_type` and `sqlite3_value_type`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Datatype {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit IEEE float.
    Float,
    /// UTF-8 text.
    Text,
    /// Opaque bytes.
    Blob,
    /// SQL NULL.
    Null,
}

impl TryFrom<i32> for Datatype {
    type Error = i32;

    fn try_from(raw: i32) -> std::result::Result<Self, i32> {
        match raw {
            1 => Ok(Datatype::Integer),
            2 => Ok(Datatype::Float),
            3 => Ok(Datatype::Text),
            4 => Ok(Datatype::Blob),
            5 => Ok(Datatype::Null),
            other => Err(other),
        }
    }
}

/// Text encoding and function flags for `sqlite3_create_function`.
pub mod func_flags {
    /// UTF-8 text representation.
    pub const UTF8: i32 = 1;
    /// Same inputs always produce the same output.
    pub const DETERMINISTIC: i32 = 0x0000_0800;
    /// Function may only be invoked from top-level SQL.
    pub const DIRECTONLY: i32 = 0x0008_0000;
}

/// Registration modes understood by `sqlite3_wasm_create_function`.
pub mod func_mode {
    #![allow(missing_docs)]

    pub const SCALAR: i32 = 0;
    pub const AGGREGATE: i32 = 1;
    pub const WINDOW: i32 = 2;
}

/// `sqlite3_deserialize` flags.
pub mod deserialize {
    /// The engine frees the buffer when the connection closes.
    pub const FREEONCLOSE: i32 = 1;
    /// The engine may grow the buffer with its allocator.
    pub const RESIZEABLE: i32 = 2;
    /// The database is read-only.
    pub const READONLY: i32 = 4;
}

/// `sqlite3_serialize` flags.
pub mod serialize {
    /// Return the engine's own buffer instead of a copy; it must not be freed.
    pub const NOCOPY: i32 = 1;
}

/// Destructor sentinels for bind and result setters.
pub mod destructor {
    /// The engine does not copy; the buffer outlives the call.
    pub const STATIC: i32 = 0;
    /// The engine copies the buffer before returning.
    pub const TRANSIENT: i32 = -1;
}
