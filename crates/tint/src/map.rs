//! Object tables keyed by raw native handle.

use dashmap::{
    DashMap,
    mapref::one::{Ref, RefMut},
};
use nohash_hasher::BuildNoHashHasher;

/// Fast integer [`DashMap`]
pub type IntDashMap<K, V> = DashMap<K, V, BuildNoHashHasher<K>>;

/// Metadata of live native objects of one category.
///
/// An entry exists exactly between the native creation and destruction of the object,
/// which makes the table the source of truth for handle validity.
pub struct HandleTable<T> {
    map: IntDashMap<u64, T>,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            map: IntDashMap::default(),
        }
    }

    /// Registers an object. Null handles are never registered.
    pub fn insert(&self, raw: u64, value: T) -> bool {
        if raw == 0 {
            return false;
        }

        self.map.insert(raw, value);
        true
    }

    pub fn remove(&self, raw: u64) -> Option<T> {
        self.map.remove(&raw).map(|(_, value)| value)
    }

    #[inline]
    pub fn contains(&self, raw: u64) -> bool {
        raw != 0 && self.map.contains_key(&raw)
    }

    #[inline]
    pub fn get(&self, raw: u64) -> Option<Ref<'_, u64, T>> {
        self.map.get(&raw)
    }

    #[inline]
    pub fn get_mut(&self, raw: u64) -> Option<RefMut<'_, u64, T>> {
        self.map.get_mut(&raw)
    }

    pub fn with<R>(&self, raw: u64, f: impl FnOnce(&T) -> R) -> Option<R> {
        Some(f(&*self.map.get(&raw)?))
    }

    pub fn keys(&self) -> Vec<u64> {
        self.map.iter().map(|entry| *entry.key()).collect()
    }

    /// Removes every entry, returning them for teardown.
    pub fn drain(&self) -> Vec<(u64, T)> {
        let keys = self.keys();
        keys.into_iter()
            .filter_map(|key| self.map.remove(&key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T: Copy> HandleTable<T> {
    #[inline]
    pub fn get_copied(&self, raw: u64) -> Option<T> {
        self.map.get(&raw).map(|value| *value)
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::HandleTable;

    #[test]
    fn validity_follows_lifetime() {
        let table = HandleTable::<u32>::new();
        assert!(!table.contains(0x10));

        assert!(table.insert(0x10, 7));
        assert!(table.contains(0x10));
        assert_eq!(table.get_copied(0x10), Some(7));

        assert_eq!(table.remove(0x10), Some(7));
        assert!(!table.contains(0x10));
        assert_eq!(table.remove(0x10), None);
    }

    #[test]
    fn null_is_never_valid() {
        let table = HandleTable::<()>::new();
        assert!(!table.insert(0, ()));
        assert!(!table.contains(0));
        assert!(table.is_empty());
    }

    #[test]
    fn drain_empties() {
        let table = HandleTable::new();
        for raw in 1..=4u64 {
            table.insert(raw, raw * 2);
        }

        let mut drained = table.drain();
        drained.sort();
        assert_eq!(drained, vec![(1, 2), (2, 4), (3, 6), (4, 8)]);
        assert!(table.is_empty());
    }
}
