use std::fmt;

use thiserror::Error;

use super::constants::codes;

/// Error reported by the engine or raised by host code on the engine's behalf.
///
/// Always carries a result code that is not one of the OK/ROW/DONE sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteError {
    code: i32,
    extended_code: Option<i32>,
    message: Option<String>,
}

impl SqliteError {
    /// Creates an error carrying only a result code.
    pub fn new(code: i32) -> Self {
        debug_assert!(!is_success(code), "success code {code} is not an error");
        Self {
            code,
            extended_code: None,
            message: None,
        }
    }

    /// Creates an error carrying a code and a human-readable message.
    pub fn with_message(code: i32, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(code)
        }
    }

    /// Returns `None` for the OK/ROW/DONE sentinels and an error otherwise.
    pub fn from_code(code: i32) -> Option<Self> {
        (!is_success(code)).then(|| Self::new(code))
    }

    /// Attaches the engine's extended result code.
    pub fn extended(mut self, extended_code: i32) -> Self {
        if extended_code != 0 && extended_code != self.code {
            self.extended_code = Some(extended_code);
        }
        self
    }

    /// The result code the error was raised with.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The extended result code, when the engine reported one that differs from `code`.
    pub fn extended_code(&self) -> Option<i32> {
        self.extended_code
    }

    /// The most specific code available.
    pub fn effective_code(&self) -> i32 {
        self.extended_code.unwrap_or(self.code)
    }

    /// The message attached to the error, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for SqliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.effective_code();
        let name = codes::name(code)
            .or_else(|| codes::name(codes::primary(code)))
            .unwrap_or("UNKNOWN");
        write!(f, "{name} ({code})")?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SqliteError {}

/// Returns true for the codes that never materialize as errors.
pub fn is_success(code: i32) -> bool {
    matches!(code, codes::OK | codes::ROW | codes::DONE)
}

/// Errors produced by the host layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Structured error: engine-reported or raised by a backend/function.
    #[error("sqlite: {0}")]
    Sqlite(#[from] SqliteError),
    /// Host I/O failure, reported to the engine as IOERR.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The engine referenced a handle the host never registered.
    #[error("ABI violation: {0}")]
    AbiViolation(String),
    /// A pointer/length pair falls outside the engine's linear memory.
    #[error("engine pointer {ptr:#x} (+{len}) is outside linear memory")]
    OutOfBounds {
        /// Offending address.
        ptr: u32,
        /// Length of the access.
        len: usize,
    },
    /// The engine module was built against a different library version.
    #[error("SQLite version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version the host was built for.
        expected: i32,
        /// Version reported by the module.
        actual: i32,
    },
    /// The engine module lacks a required export.
    #[error("engine module does not export `{0}`")]
    MissingExport(&'static str),
    /// The engine was re-entered from inside one of its own callbacks.
    #[error("engine is busy: re-entrant call from inside an engine callback")]
    Reentrant,
    /// wasmtime failure (compilation, instantiation, trap).
    #[error("wasm runtime: {0}")]
    Wasm(wasmtime::Error),
    /// Invalid configuration.
    #[error("configuration: {0}")]
    Config(String),
    /// A loadable extension could not be linked.
    #[error("extension: {0}")]
    Extension(String),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Resource-misuse error, raised at the point of misuse.
    pub fn misuse(message: impl Into<String>) -> Self {
        Error::Sqlite(SqliteError::with_message(codes::MISUSE, message))
    }

    /// Protocol violation by the engine.
    pub fn abi(message: impl Into<String>) -> Self {
        Error::AbiViolation(message.into())
    }

    /// Structured error with only a code.
    pub fn code_only(code: i32) -> Self {
        Error::Sqlite(SqliteError::new(code))
    }

    /// Engine result code for recoverable failures; `None` for protocol and
    /// programmer errors, which must never be flattened into a code.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Sqlite(err) => Some(err.effective_code()),
            Error::Io(_) => Some(codes::IOERR),
            _ => None,
        }
    }

    /// Returns the structured error, if this is one.
    pub fn as_sqlite(&self) -> Option<&SqliteError> {
        match self {
            Error::Sqlite(err) => Some(err),
            _ => None,
        }
    }

    /// Recovers a host error that crossed the engine as a trap.
    pub fn from_wasm(err: wasmtime::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(host) => host,
            Err(other) => Error::Wasm(other),
        }
    }
}

impl From<wasmtime::Error> for Error {
    fn from(err: wasmtime::Error) -> Self {
        Error::from_wasm(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Runs `f` and flattens the outcome into an engine result code.
///
/// Recoverable failures become their code; anything else is re-raised.
pub fn wrap(f: impl FnOnce() -> Result<()>) -> Result<i32> {
    match f() {
        Ok(()) => Ok(codes::OK),
        Err(err) => match err.code() {
            Some(code) => Ok(code),
            None => Err(err),
        },
    }
}
