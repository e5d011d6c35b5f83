use std::sync::Arc;

use rustc_hash::FxHashMap;
use wasmtime::{StoreLimits, StoreLimitsBuilder};

use super::exports::EngineExports;
use crate::db::ExecValue;
use crate::func::FunctionEntry;
use crate::primitives::registry::Registry;
use crate::types::{Error, Result};
use crate::vfs::{Vfs, VfsHost};

/// Destination of the rows `sqlite3_wasm_exec` reports.
pub(crate) enum ExecSink {
    /// Rows are buffered and returned when exec finishes.
    Collect(Vec<Vec<ExecValue>>),
    /// Rows go to a caller closure; `false` aborts the statement.
    Callback(Box<dyn FnMut(&[ExecValue]) -> bool + Send>),
}

/// Host-side bookkeeping for one open connection.
#[derive(Debug, Default)]
pub(crate) struct Connection {
    pub(crate) serial: u64,
    /// Live statement pointer -> serial.
    pub(crate) statements: FxHashMap<u32, u64>,
    /// Function ids registered on this connection.
    pub(crate) functions: Vec<u32>,
}

/// Everything the host keeps per engine instance. Lives inside the
/// wasmtime store, so two instances never share a table.
pub struct HostState {
    pub(crate) exports: Option<Arc<EngineExports>>,
    pub(crate) vfs: VfsHost,
    pub(crate) functions: Registry<FunctionEntry>,
    pub(crate) exec_sinks: Registry<ExecSink>,
    pub(crate) connections: FxHashMap<u32, Connection>,
    pub(crate) fallback: Arc<dyn Vfs>,
    pub(crate) limits: StoreLimits,
    next_serial: u64,
}

impl HostState {
    pub(crate) fn new(fallback: Arc<dyn Vfs>, max_memory_pages: Option<u32>) -> Self {
        let mut limits = StoreLimitsBuilder::new();
        if let Some(pages) = max_memory_pages {
            limits = limits.memory_size(pages as usize * 65_536);
        }
        Self {
            exports: None,
            vfs: VfsHost::new(),
            functions: Registry::new("function"),
            exec_sinks: Registry::new("exec callback"),
            connections: FxHashMap::default(),
            fallback,
            limits: limits.build(),
            next_serial: 0,
        }
    }

    /// The bound export table. Imports that fire before binding finishes
    /// (none should) are protocol violations.
    pub(crate) fn exports(&self) -> Result<Arc<EngineExports>> {
        self.exports
            .clone()
            .ok_or_else(|| Error::abi("engine called back before its exports were bound"))
    }

    /// Read-only view of the capability bridge.
    pub fn vfs(&self) -> &VfsHost {
        &self.vfs
    }

    /// Number of live function registrations.
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    fn serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    pub(crate) fn track_connection(&mut self, db: u32) -> u64 {
        let serial = self.serial();
        self.connections.insert(
            db,
            Connection {
                serial,
                ..Connection::default()
            },
        );
        serial
    }

    /// Validates a `(db, serial)` pair the caller holds.
    pub(crate) fn connection(&mut self, db: u32, serial: u64) -> Result<&mut Connection> {
        match self.connections.get_mut(&db) {
            Some(conn) if conn.serial == serial => Ok(conn),
            _ => Err(Error::misuse("database connection is closed")),
        }
    }

    pub(crate) fn untrack_connection(&mut self, db: u32) -> Option<Connection> {
        self.connections.remove(&db)
    }

    pub(crate) fn track_statement(&mut self, db: u32, db_serial: u64, stmt: u32) -> Result<u64> {
        let serial = self.serial();
        self.connection(db, db_serial)?.statements.insert(stmt, serial);
        Ok(serial)
    }

    /// Validates a statement handle and the connection it belongs to.
    pub(crate) fn statement(&mut self, db: u32, db_serial: u64, stmt: u32, serial: u64) -> Result<()> {
        let conn = self.connection(db, db_serial)?;
        match conn.statements.get(&stmt) {
            Some(&live) if live == serial => Ok(()),
            _ => Err(Error::misuse("statement is finalized")),
        }
    }

    /// Drops a function the engine destroyed, including the owning
    /// connection's record of it.
    pub(crate) fn release_function(&mut self, id: u32) -> Option<FunctionEntry> {
        for conn in self.connections.values_mut() {
            conn.functions.retain(|&f| f != id);
        }
        self.functions.remove(id)
    }

    pub(crate) fn untrack_statement(&mut self, db: u32, stmt: u32) {
        if let Some(conn) = self.connections.get_mut(&db) {
            conn.statements.remove(&stmt);
        }
    }

    /// Number of tracked open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
