//! Reference counted storage with generation checked handles.
use std::marker::PhantomData;

use slab::Slab;

use crate::{CtsError, Result};

/// A handle into an [`Arena`]. A handle stays invalid once the value it pointed to was freed,
/// even if the slot is reused.
pub struct Handle<T> {
    key: usize,
    generation: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.generation.hash(state);
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}

struct Entry<T> {
    value: T,
    generation: u64,
    ref_count: usize,
}

/// Owns values that are shared by handle. A value is dropped when its last reference is released.
pub struct Arena<T> {
    entries: Slab<Entry<T>>,
    next_generation: u64,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            entries: Slab::new(),
            next_generation: 0,
        }
    }
}

impl<T> std::fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the value into the arena. The returned handle holds the first reference.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        let generation = self.next_generation;
        self.next_generation += 1;

        let key = self.entries.insert(Entry {
            value,
            generation,
            ref_count: 1,
        });

        Handle {
            key,
            generation,
            _marker: PhantomData,
        }
    }

    /// Returns the value the handle points to.
    pub fn get(&self, handle: Handle<T>) -> Result<&T> {
        self.entry(handle).map(|entry| &entry.value)
    }

    /// Returns the value the handle points to.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T> {
        self.entry_mut(handle).map(|entry| &mut entry.value)
    }

    /// Adds a reference to the value.
    pub fn retain(&mut self, handle: Handle<T>) -> Result<()> {
        self.entry_mut(handle)?.ref_count += 1;
        Ok(())
    }

    /// Removes a reference from the value. Returns the value if this was the last reference.
    pub fn release(&mut self, handle: Handle<T>) -> Result<Option<T>> {
        let entry = self.entry_mut(handle)?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(None);
        }

        Ok(Some(self.entries.remove(handle.key).value))
    }

    /// Number of references the value currently has.
    pub fn ref_count(&self, handle: Handle<T>) -> Result<usize> {
        self.entry(handle).map(|entry| entry.ref_count)
    }

    /// Returns true if the handle points to a live value.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.entry(handle).is_ok()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no value is alive.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, handle: Handle<T>) -> Result<&Entry<T>> {
        self.entries
            .get(handle.key)
            .filter(|entry| entry.generation == handle.generation)
            .ok_or(CtsError::InvalidHandle)
    }

    fn entry_mut(&mut self, handle: Handle<T>) -> Result<&mut Entry<T>> {
        self.entries
            .get_mut(handle.key)
            .filter(|entry| entry.generation == handle.generation)
            .ok_or(CtsError::InvalidHandle)
    }
}
