//! Integer-keyed handle tables.
//!
//! The engine only ever sees integers; these tables map them back to host
//! objects. A handle the engine presents that the host never issued is a
//! protocol violation, so the `must_*` accessors fail with
//! [`Error::AbiViolation`] instead of a result code.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::types::{Error, Result};

/// Monotonic integer-keyed table. Ids start at 1 and are never reused.
#[derive(Debug)]
pub struct Registry<T> {
    name: &'static str,
    entries: FxHashMap<u32, T>,
    next_id: u32,
}

impl<T> Registry<T> {
    /// Creates an empty table; `name` is used in violation messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Stores `value` under a freshly issued id.
    pub fn insert(&mut self, value: T) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.entries.insert(id, value);
        id
    }

    /// Stores `value` under an id issued by someone else (e.g. an engine
    /// pointer). Returns the previous occupant.
    pub fn insert_at(&mut self, id: u32, value: T) -> Option<T> {
        self.entries.insert(id, value)
    }

    /// Looks up an id the host might not have issued.
    pub fn get(&self, id: u32) -> Option<&T> {
        self.entries.get(&id)
    }

    /// Looks up an id the host might not have issued, mutably.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    /// Looks up an id the engine claims the host issued.
    pub fn must_get(&self, id: u32) -> Result<&T> {
        self.entries.get(&id).ok_or_else(|| self.violation(id))
    }

    /// Mutable variant of [`Registry::must_get`].
    pub fn must_get_mut(&mut self, id: u32) -> Result<&mut T> {
        let name = self.name;
        self.entries
            .get_mut(&id)
            .ok_or_else(|| Error::abi(format!("{name} {id} is not registered")))
    }

    /// Removes an id the engine claims the host issued.
    pub fn must_remove(&mut self, id: u32) -> Result<T> {
        self.entries.remove(&id).ok_or_else(|| self.violation(id))
    }

    /// Removes an id if present.
    pub fn remove(&mut self, id: u32) -> Option<T> {
        self.entries.remove(&id)
    }

    /// Returns true if `id` is live.
    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entries are live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over live entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }

    /// Removes every entry, leaving the id counter untouched.
    pub fn drain(&mut self) -> impl Iterator<Item = (u32, T)> + '_ {
        self.entries.drain()
    }

    fn violation(&self, id: u32) -> Error {
        Error::abi(format!("{} {id} is not registered", self.name))
    }
}

/// Table of shared objects keyed by an externally chosen id, with lookup
/// back from the object to its id by pointer identity.
#[derive(Debug)]
pub struct IdentityRegistry<T: ?Sized> {
    inner: Registry<Arc<T>>,
}

impl<T: ?Sized> IdentityRegistry<T> {
    /// Creates an empty table.
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Registry::new(name),
        }
    }

    /// Binds `value` to `id`, replacing any previous binding.
    pub fn insert_at(&mut self, id: u32, value: Arc<T>) -> Option<Arc<T>> {
        self.inner.insert_at(id, value)
    }

    /// Returns the id `value` is bound to, if any.
    pub fn id_of(&self, value: &Arc<T>) -> Option<u32> {
        self.inner
            .iter()
            .find(|(_, candidate)| Arc::ptr_eq(candidate, value))
            .map(|(id, _)| id)
    }

    /// Every binding, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Arc<T>)> {
        self.inner.iter()
    }

    /// Looks up an id the engine claims the host issued.
    pub fn must_get(&self, id: u32) -> Result<&Arc<T>> {
        self.inner.must_get(id)
    }

    /// Looks up an id that may be unbound.
    pub fn get(&self, id: u32) -> Option<&Arc<T>> {
        self.inner.get(id)
    }

    /// Unbinds `id`.
    pub fn remove(&mut self, id: u32) -> Option<Arc<T>> {
        self.inner.remove(id)
    }

    /// Number of bound ids.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut reg = Registry::new("file");
        let a = reg.insert("a");
        let b = reg.insert("b");
        assert_eq!((a, b), (1, 2));
        reg.must_remove(a).unwrap();
        assert_eq!(reg.insert("c"), 3);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn unknown_ids_are_protocol_violations() {
        let mut reg: Registry<()> = Registry::new("file");
        assert!(matches!(reg.must_get(9), Err(Error::AbiViolation(_))));
        assert!(matches!(reg.must_remove(9), Err(Error::AbiViolation(_))));
        assert!(reg.remove(9).is_none());
    }

    #[test]
    fn identity_lookup_uses_pointer_equality() {
        let mut reg: IdentityRegistry<str> = IdentityRegistry::new("backend");
        let first: Arc<str> = Arc::from("memory");
        let twin: Arc<str> = Arc::from("memory");
        reg.insert_at(4096, first.clone());
        assert_eq!(reg.id_of(&first), Some(4096));
        assert_eq!(reg.id_of(&twin), None);
        assert!(reg.remove(4096).is_some());
        assert!(reg.is_empty());
    }
}
