//! Accessors over the engine's linear memory.
//!
//! The free functions here work on a borrowed `&[u8]`/`&mut [u8]` view and
//! are what capability dispatch uses while it also holds the host state.
//! [`MemoryBridge`] wraps them with the engine allocator and re-borrows the
//! memory from the store on every call, since engine-side allocation may
//! grow the buffer between calls.

mod bridge;

pub use bridge::{MemoryBridge, Scratch};

use std::ops::Range;

use crate::types::{constants::codes, Error, Result, SqliteError};

/// A 32-bit byte offset into linear memory.
pub type Ptr = u32;

/// Size of a pointer slot in linear memory.
pub const PTR_SIZE: usize = 4;

fn span(mem_len: usize, ptr: Ptr, len: usize) -> Result<Range<usize>> {
    let start = ptr as usize;
    match start.checked_add(len) {
        Some(end) if end <= mem_len => Ok(start..end),
        _ => Err(Error::OutOfBounds { ptr, len }),
    }
}

/// Borrows `len` bytes at `ptr`.
pub fn bytes(mem: &[u8], ptr: Ptr, len: usize) -> Result<&[u8]> {
    let range = span(mem.len(), ptr, len)?;
    Ok(&mem[range])
}

/// Mutably borrows `len` bytes at `ptr`.
pub fn bytes_mut(mem: &mut [u8], ptr: Ptr, len: usize) -> Result<&mut [u8]> {
    let range = span(mem.len(), ptr, len)?;
    Ok(&mut mem[range])
}

/// Reads a NUL-terminated string starting at `ptr`.
///
/// The engine is trusted to terminate the region; running off the end of
/// memory is reported as out of bounds rather than read past.
pub fn read_cstr(mem: &[u8], ptr: Ptr) -> Result<String> {
    let start = ptr as usize;
    let tail = mem.get(start..).ok_or(Error::OutOfBounds { ptr, len: 0 })?;
    let len = tail.iter().position(|&b| b == 0).ok_or(Error::OutOfBounds {
        ptr,
        len: tail.len(),
    })?;
    Ok(String::from_utf8_lossy(&tail[..len]).into_owned())
}

/// Writes `s` plus a terminator into a buffer of `capacity` bytes.
///
/// Fails with TOOBIG, writing nothing, unless the encoded length is at most
/// `capacity - 1`.
pub fn write_bounded_str(mem: &mut [u8], ptr: Ptr, capacity: usize, s: &str) -> Result<()> {
    let encoded = s.as_bytes();
    if encoded.len() >= capacity {
        return Err(SqliteError::with_message(
            codes::TOOBIG,
            format!("{} bytes do not fit in a {capacity} byte buffer", encoded.len()),
        )
        .into());
    }
    let dst = bytes_mut(mem, ptr, encoded.len() + 1)?;
    dst[..encoded.len()].copy_from_slice(encoded);
    dst[encoded.len()] = 0;
    Ok(())
}

/// Writes as much of `s` as fits (on a char boundary) plus a terminator.
pub fn write_truncated_str(mem: &mut [u8], ptr: Ptr, capacity: usize, s: &str) -> Result<()> {
    if capacity == 0 {
        return Ok(());
    }
    let mut end = s.len().min(capacity - 1);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    write_bounded_str(mem, ptr, capacity, &s[..end])
}

fn read_array<const N: usize>(mem: &[u8], ptr: Ptr) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes(mem, ptr, N)?);
    Ok(out)
}

/// Reads a little-endian u32.
pub fn read_u32(mem: &[u8], ptr: Ptr) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array(mem, ptr)?))
}

/// Writes a little-endian u32.
pub fn write_u32(mem: &mut [u8], ptr: Ptr, v: u32) -> Result<()> {
    bytes_mut(mem, ptr, 4)?.copy_from_slice(&v.to_le_bytes());
    Ok(())
}

/// Reads a little-endian i64.
pub fn read_i64(mem: &[u8], ptr: Ptr) -> Result<i64> {
    Ok(i64::from_le_bytes(read_array(mem, ptr)?))
}

/// Writes a little-endian i64.
pub fn write_i64(mem: &mut [u8], ptr: Ptr, v: i64) -> Result<()> {
    bytes_mut(mem, ptr, 8)?.copy_from_slice(&v.to_le_bytes());
    Ok(())
}

/// Reads a little-endian f64.
pub fn read_f64(mem: &[u8], ptr: Ptr) -> Result<f64> {
    Ok(f64::from_le_bytes(read_array(mem, ptr)?))
}

/// Writes a little-endian f64.
pub fn write_f64(mem: &mut [u8], ptr: Ptr, v: f64) -> Result<()> {
    bytes_mut(mem, ptr, 8)?.copy_from_slice(&v.to_le_bytes());
    Ok(())
}

/// Writes a boolean out-parameter as a 0/1 u32.
pub fn write_bool(mem: &mut [u8], ptr: Ptr, v: bool) -> Result<()> {
    write_u32(mem, ptr, u32::from(v))
}

/// Dereferences a pointer-sized slot.
pub fn deref_ptr(mem: &[u8], ptr: Ptr) -> Result<Ptr> {
    read_u32(mem, ptr)
}

/// Dereferences slot `index` of a pointer array.
pub fn deref_index(mem: &[u8], array: Ptr, index: usize) -> Result<Ptr> {
    let offset = index
        .checked_mul(PTR_SIZE)
        .and_then(|off| u32::try_from(off).ok())
        .and_then(|off| array.checked_add(off))
        .ok_or(Error::OutOfBounds {
            ptr: array,
            len: index.saturating_mul(PTR_SIZE),
        })?;
    deref_ptr(mem, offset)
}

/// Converts an engine `i32` pointer argument into a [`Ptr`].
pub fn ptr(raw: i32) -> Ptr {
    raw as u32
}
