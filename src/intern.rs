//! Structural interning for types and attributes.
//!
//! Both [`Type`](crate::Type) and [`Attr`](crate::Attr) are canonical: two
//! values with identical content are the same heap object, so equality and
//! hashing throughout the crate operate on a stable id instead of recursing
//! into the content.
//!
//! # Thread Safety
//!
//! Tables are global, lock-free (papaya) and insert-only. Interning the same
//! content from different threads returns the same `Arc`, so `Arc::ptr_eq`
//! holds across thread boundaries. Entries are never removed: the set of
//! distinct types/attributes in a compilation session is small and bounded.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use papaya::HashMap;

// Global monotonic counter shared by all interning tables. Ids never repeat,
// which makes them safe hash/equality keys for nested content.
static INTERN_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_intern_id() -> u64 {
    INTERN_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An interned node: stable id plus the structural content.
#[derive(Debug)]
pub struct Interned<K> {
    pub id: u64,
    pub content: K,
}

/// A global insert-only interning table.
pub struct Interner<K: 'static> {
    map: OnceLock<HashMap<K, Arc<Interned<K>>>>,
}

impl<K> Interner<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub const fn new() -> Self {
        Self { map: OnceLock::new() }
    }

    fn map(&self) -> &HashMap<K, Arc<Interned<K>>> {
        self.map.get_or_init(HashMap::new)
    }

    /// Return the canonical node for `content`, creating it on first use.
    pub fn intern(&self, content: K) -> Arc<Interned<K>> {
        let map = self.map();
        let guard = map.guard();

        // Fast path: already interned.
        if let Some(existing) = map.get(&content, &guard) {
            return existing.clone();
        }

        let node = Arc::new(Interned { id: next_intern_id(), content: content.clone() });
        match map.try_insert(content, node.clone(), &guard) {
            Ok(_) => node,
            // Lost the race: another thread interned the same content first.
            Err(occupied) => occupied.current.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TABLE: Interner<(u32, bool)> = Interner::new();

    #[test]
    fn test_same_content_same_object() {
        let a = TABLE.intern((8, true));
        let b = TABLE.intern((8, true));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_distinct_content_distinct_ids() {
        let a = TABLE.intern((8, true));
        let b = TABLE.intern((8, false));
        assert_ne!(a.id, b.id);
    }
}
