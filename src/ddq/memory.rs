//! In-memory deduplication storage
//!
//! A circular buffer paired with a membership set. Eviction from the buffer
//! and removal from the set happen under the same critical section; the lock
//! is held only for the O(1) slot manipulation.

use std::collections::HashSet;
use std::sync::Mutex;

use super::DdqStore;

/// Per-process circular-buffer dedup window.
#[derive(Debug)]
pub struct MemoryDdq {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Option<String>>,
    cursor: usize,
    seen: HashSet<String>,
}

impl MemoryDdq {
    /// Creates a window of size `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                slots: vec![None; capacity],
                cursor: 0,
                seen: HashSet::with_capacity(capacity),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic during an O(1) slot update; the
        // buffer and set stay coherent, so recover the guard.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DdqStore for MemoryDdq {
    fn contains(&self, uuid: &str) -> bool {
        self.lock().seen.contains(uuid)
    }

    fn add(&self, uuid: &str) {
        let mut inner = self.lock();
        if inner.seen.contains(uuid) {
            return;
        }

        let cursor = inner.cursor;
        if let Some(evicted) = inner.slots[cursor].take() {
            inner.seen.remove(&evicted);
        }
        inner.slots[cursor] = Some(uuid.to_string());
        inner.seen.insert(uuid.to_string());
        inner.cursor = (cursor + 1) % self.capacity;
    }

    fn clear(&self) {
        let mut inner = self.lock();
        inner.slots.iter_mut().for_each(|slot| *slot = None);
        inner.cursor = 0;
        inner.seen.clear();
    }

    fn len(&self) -> usize {
        self.lock().seen.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn storage_kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_after_add() {
        let ddq = MemoryDdq::new(10);
        assert!(!ddq.contains("u1"));

        ddq.add("u1");
        assert!(ddq.contains("u1"));
        assert_eq!(ddq.len(), 1);
    }

    #[test]
    fn re_adding_a_known_uuid_is_a_no_op() {
        let ddq = MemoryDdq::new(3);
        ddq.add("u1");
        ddq.add("u1");
        assert_eq!(ddq.len(), 1);

        // The duplicate add consumed no slot.
        ddq.add("u2");
        ddq.add("u3");
        assert!(ddq.contains("u1"));
        assert_eq!(ddq.len(), 3);
    }

    #[test]
    fn oldest_uuid_is_evicted_when_full() {
        let ddq = MemoryDdq::new(3);
        ddq.add("u1");
        ddq.add("u2");
        ddq.add("u3");
        assert_eq!(ddq.len(), 3);

        ddq.add("u4");
        assert!(!ddq.contains("u1"));
        assert!(ddq.contains("u2"));
        assert!(ddq.contains("u3"));
        assert!(ddq.contains("u4"));
        assert_eq!(ddq.len(), 3);
    }

    #[test]
    fn utilization_is_a_percentage() {
        let ddq = MemoryDdq::new(4);
        assert_eq!(ddq.utilization(), 0.0);
        ddq.add("u1");
        assert_eq!(ddq.utilization(), 25.0);
        ddq.add("u2");
        ddq.add("u3");
        ddq.add("u4");
        assert_eq!(ddq.utilization(), 100.0);
    }

    #[test]
    fn clear_resets_the_window() {
        let ddq = MemoryDdq::new(2);
        ddq.add("u1");
        ddq.add("u2");
        ddq.clear();
        assert!(ddq.is_empty());
        assert!(!ddq.contains("u1"));

        // The window keeps working after a clear.
        ddq.add("u3");
        assert!(ddq.contains("u3"));
    }

    #[test]
    fn concurrent_adds_stay_bounded() {
        use std::sync::Arc;

        let ddq = Arc::new(MemoryDdq::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ddq = Arc::clone(&ddq);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        ddq.add(&format!("uuid-{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ddq.len(), 50);
    }
}
