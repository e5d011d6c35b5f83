//! Connections and prepared statements.
//!
//! [`Database`] and [`Statement`] hold an engine pointer plus a serial
//! that the host state validates before every engine call, so a handle
//! that outlived its connection fails with MISUSE instead of touching
//! freed engine memory.

mod database;
mod options;
mod statement;

pub use database::{Database, ExecRow, ExecValue};
pub use options::OpenOptions;
pub use statement::{Rows, Statement};

use crate::types::{constants::codes, Result, SqliteError};

/// Converts a zero-based column or one-based parameter index.
fn engine_index(index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| {
        SqliteError::with_message(codes::RANGE, format!("index {index} out of range")).into()
    })
}
