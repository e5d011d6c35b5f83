//! Low-level primitives the capability bridges are built from.
//!
//! Includes linear-memory access, handle registries, and positioned file
//! I/O.

/// Positioned file I/O.
///
/// Read/write-at helpers that paper over the Unix and Windows APIs.
pub mod io;

/// Access to the engine's linear memory.
///
/// Bounds-checked accessors plus the allocator-backed bridge and its
/// scratch arena.
pub mod memory;

/// Integer-keyed handle tables.
pub mod registry;
