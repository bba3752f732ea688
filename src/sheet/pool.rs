//! Bounded concurrent string interning.
//!
//! Spreadsheets repeat short text values heavily -- status columns, category
//! names, shared labels. The pool deduplicates them across every concurrently
//! loading file so each distinct value is stored once. The pool is the only
//! shared mutable structure in the ingestion pipeline; a single lock around
//! the map keeps the capacity check and the insert atomic.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Text longer than this is never pooled.
pub const MAX_POOLED_LEN: usize = 100;

/// Hard bound on distinct pooled entries. Once reached, interning stops
/// growing the pool and new values are returned unpooled; nothing is evicted.
pub const DEFAULT_CAPACITY: usize = 50_000;

/// Concurrent get-or-insert cache for short text values.
#[derive(Debug)]
pub struct StringPool {
    entries: Mutex<HashSet<Arc<str>>>,
    capacity: usize,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashSet::new()),
            capacity,
        }
    }

    /// Return a shared handle for `text`, deduplicated within the size cap.
    ///
    /// Interning the same in-cap string twice yields pointer-equal handles.
    /// Oversized or over-cap values are returned as fresh allocations.
    pub fn intern(&self, text: &str) -> Arc<str> {
        if text.len() > MAX_POOLED_LEN {
            return Arc::from(text);
        }
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(text) {
            return Arc::clone(existing);
        }
        let value: Arc<str> = Arc::from(text);
        if entries.len() < self.capacity {
            entries.insert(Arc::clone(&value));
        }
        value
    }

    /// Number of distinct pooled entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let pool = StringPool::new();
        let a = pool.intern("Active");
        let b = pool.intern("Active");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn oversized_text_is_not_pooled() {
        let pool = StringPool::new();
        let long = "x".repeat(MAX_POOLED_LEN + 1);
        let a = pool.intern(&long);
        let b = pool.intern(&long);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert!(pool.is_empty());
    }

    #[test]
    fn capacity_halts_growth_without_failing() {
        let pool = StringPool::with_capacity(2);
        pool.intern("a");
        pool.intern("b");
        let c1 = pool.intern("c");
        let c2 = pool.intern("c");
        assert_eq!(pool.len(), 2);
        // Past the cap the value is still usable, just not shared.
        assert!(!Arc::ptr_eq(&c1, &c2));
        assert_eq!(c1, c2);
        // Entries pooled before the cap keep deduplicating.
        assert!(Arc::ptr_eq(&pool.intern("a"), &pool.intern("a")));
    }

    #[test]
    fn concurrent_interning_converges() {
        let pool = std::sync::Arc::new(StringPool::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = std::sync::Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        pool.intern(&format!("value-{}", i % 10));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.len(), 10);
    }
}
