/// Dedup Module
///
/// Tracks which `EventRecordID`s have already been forwarded in this process.
/// Nothing is persisted: a restart forgets every id.
///
/// Two stores are provided:
/// - [`InMemoryDedupStore`] keeps every id it has seen, so memory grows with the
///   number of distinct records for the lifetime of the process.
/// - [`WindowedDedupStore`] keeps only the most recent `capacity` ids. Memory is
///   bounded, but an id that has been evicted is treated as new again and will
///   be re-forwarded. It never reports an unseen id as a duplicate, so records
///   are never dropped, only possibly written twice.
use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;

pub trait DedupStore: Send {
    /// Returns `false` the first time `id` is seen (and remembers it), `true` after that
    fn is_duplicate(&mut self, id: u64) -> bool;

    /// Number of ids currently remembered
    fn len(&self) -> usize;
}

/// Build the store selected by configuration: `0` means unbounded
pub fn from_capacity(capacity: usize) -> Box<dyn DedupStore> {
    if capacity == 0 {
        Box::new(InMemoryDedupStore::new())
    } else {
        Box::new(WindowedDedupStore::new(capacity))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    seen: HashSet<u64>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupStore for InMemoryDedupStore {
    fn is_duplicate(&mut self, id: u64) -> bool {
        !self.seen.insert(id)
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

pub struct WindowedDedupStore {
    seen: LruCache<u64, ()>,
}

impl WindowedDedupStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { seen: LruCache::new(capacity) }
    }
}

impl DedupStore for WindowedDedupStore {
    fn is_duplicate(&mut self, id: u64) -> bool {
        // `contains` does not promote, so eviction follows first-sight order
        if self.seen.contains(&id) {
            return true;
        }

        self.seen.put(id, ());
        false
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sight_then_duplicate() {
        let mut store = InMemoryDedupStore::new();

        assert!(!store.is_duplicate(42));
        assert!(store.is_duplicate(42));
        assert!(!store.is_duplicate(43));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_in_memory_store_never_forgets() {
        let mut store = InMemoryDedupStore::new();
        for id in 0..10_000 {
            assert!(!store.is_duplicate(id));
        }
        assert!(store.is_duplicate(0));
        assert_eq!(store.len(), 10_000);
    }

    #[test]
    fn test_windowed_store_evicts_oldest() {
        let mut store = WindowedDedupStore::new(2);

        assert!(!store.is_duplicate(1));
        assert!(!store.is_duplicate(2));
        assert!(store.is_duplicate(1));

        // 1 is evicted, so it is forwarded again
        assert!(!store.is_duplicate(3));
        assert_eq!(store.len(), 2);
        assert!(!store.is_duplicate(1));
        assert!(store.is_duplicate(3));
    }

    #[test]
    fn test_from_capacity() {
        let mut unbounded = from_capacity(0);
        let mut bounded = from_capacity(1);

        assert_eq!(unbounded.len(), 0);
        assert!(!unbounded.is_duplicate(42));
        assert!(unbounded.is_duplicate(42));

        assert!(!bounded.is_duplicate(42));
        assert!(!bounded.is_duplicate(43));
        assert!(!bounded.is_duplicate(42));
        assert_eq!(bounded.len(), 1);
    }
}
