//! The client-side position map: `addr -> leaf label` (§4.4).
//!
//! The design assumes the position map fits in client memory (Non-goals,
//! §1), so unlike the teacher's recursive `PositionMap` ORAM, this is a
//! plain in-memory table.

use super::LeafLabel;
use crate::Address;
use std::collections::HashMap;

/// A total function from live addresses to leaf labels.
#[derive(Debug, Default, Clone)]
pub struct PositionMap {
    entries: HashMap<Address, LeafLabel>,
}

impl PositionMap {
    /// An empty position map.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The leaf an address currently maps to, if it has ever been written.
    pub fn get(&self, addr: Address) -> Option<LeafLabel> {
        self.entries.get(&addr).copied()
    }

    /// Overwrites an address's leaf, returning the previous value (if any)
    /// so callers can roll back on a failed access.
    pub fn set(&mut self, addr: Address, leaf: LeafLabel) -> Option<LeafLabel> {
        self.entries.insert(addr, leaf)
    }

    /// Restores a prior state for `addr`: either a previous leaf, or no
    /// entry at all.
    pub fn restore(&mut self, addr: Address, previous: Option<LeafLabel>) {
        match previous {
            Some(leaf) => {
                self.entries.insert(addr, leaf);
            }
            None => {
                self.entries.remove(&addr);
            }
        }
    }

    /// Iterates over all `(addr, leaf)` entries, for checkpointing.
    pub fn iter(&self) -> impl Iterator<Item = (Address, LeafLabel)> + '_ {
        self.entries.iter().map(|(a, l)| (*a, *l))
    }

    /// Number of live addresses currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no address is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry, for checkpoint restore.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let mut map = PositionMap::new();
        assert_eq!(map.get(1), None);
        let previous = map.set(1, 5);
        assert_eq!(previous, None);
        assert_eq!(map.get(1), Some(5));
    }

    #[test]
    fn restore_reverts_overwrite() {
        let mut map = PositionMap::new();
        map.set(1, 5);
        let previous = map.set(1, 9);
        map.restore(1, previous);
        assert_eq!(map.get(1), Some(5));
    }

    #[test]
    fn restore_removes_fresh_entry() {
        let mut map = PositionMap::new();
        let previous = map.set(1, 5);
        map.restore(1, previous);
        assert_eq!(map.get(1), None);
    }
}
