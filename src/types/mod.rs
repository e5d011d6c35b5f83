//! Core types shared by every layer: errors, the dynamic value model, and the
//! engine's constant space.

pub mod constants;
mod error;
mod value;

pub use constants::{AccessFlag, Datatype, LockLevel, OpenFlags, SQLITE_VERSION_NUMBER};
pub use error::{is_success, wrap, Error, Result, SqliteError};
pub use value::{to_scalar, ExtendedValue, Value};
