//! Handle table for open files and directories.
//!
//! IDs start at 1 (0 is reserved for invalid/null handle) and are never
//! reused while the table lives, so a stale handle can't silently address a
//! newer open.

use std::collections::HashMap;

/// Map from auto-generated `u64` IDs to handle state.
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: HashMap<u64, V>,
    next_id: u64,
}

impl<V> HandleTable<V> {
    /// Create a handle table with auto-incrementing IDs.
    pub fn new_auto_id() -> Self {
        Self {
            handles: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert a value with an auto-generated ID.
    pub fn insert_auto(&mut self, value: V) -> u64 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if id != 0 && !self.handles.contains_key(&id) {
                self.handles.insert(id, value);
                return id;
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<&V> {
        self.handles.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut V> {
        self.handles.get_mut(&id)
    }

    /// Remove a handle and return it.
    pub fn remove(&mut self, id: u64) -> Option<V> {
        self.handles.remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drop every handle. IDs keep counting from where they were.
    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new_auto_id()
    }
}
