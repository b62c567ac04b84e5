//! Deduplication queues
//!
//! A DDQ suppresses re-delivery of a message UUID to one handler within a
//! bounded window. One instance exists per `(message class, handler id)`
//! pair, lazily created after dedup is enabled for the class. Two storage
//! backends: an in-memory circular buffer and a Redis-backed shared store.

mod memory;
mod redis;

pub use self::memory::MemoryDdq;
pub use self::redis::{RedisDdq, RedisDdqOptions};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::DdqCapacity;
use crate::registry::HandlerId;

/// Identifies one dedup window: `"{message_class}:{handler_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DdqKey {
    class_name: String,
    handler_id: HandlerId,
}

impl DdqKey {
    /// Builds the key for a class/handler pair.
    #[must_use]
    pub fn new(class_name: impl Into<String>, handler_id: HandlerId) -> Self {
        Self {
            class_name: class_name.into(),
            handler_id,
        }
    }
}

impl fmt::Display for DdqKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class_name, self.handler_id)
    }
}

/// Bounded UUID window with O(1) membership and FIFO eviction.
///
/// `contains` is fail-open on storage backends: a transient failure behaves
/// as not-a-duplicate, preferring re-delivery over a silent drop.
pub trait DdqStore: Send + Sync {
    /// Whether the UUID was seen within the window.
    fn contains(&self, uuid: &str) -> bool;

    /// Records the UUID, evicting the oldest entry when the window is full.
    fn add(&self, uuid: &str);

    /// Empties the window.
    fn clear(&self);

    /// Current number of tracked UUIDs, bounded by the capacity.
    fn len(&self) -> usize;

    /// Whether the window is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window size N.
    fn capacity(&self) -> usize;

    /// Fill ratio as a percentage.
    fn utilization(&self) -> f64 {
        if self.capacity() == 0 {
            0.0
        } else {
            (self.len() as f64 / self.capacity() as f64) * 100.0
        }
    }

    /// Backend identifier for stats reporting.
    fn storage_kind(&self) -> &'static str;
}

/// Storage backend selection for a message class.
#[derive(Debug, Clone, Default)]
pub enum DdqStorage {
    /// Per-process circular buffer.
    #[default]
    Memory,
    /// Shared Redis store, visible across processes.
    Redis(RedisDdqOptions),
}

/// Per-class dedup policy: the enable flag is the only runtime-mutable
/// knob; capacity and storage are fixed at class build time.
#[derive(Debug)]
pub struct DedupPolicy {
    enabled: AtomicBool,
    capacity: DdqCapacity,
    storage: DdqStorage,
}

impl DedupPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(enabled: bool, capacity: DdqCapacity, storage: DdqStorage) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            capacity,
            storage,
        }
    }

    /// Whether dedup is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turns dedup on.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Turns dedup off, returning the dispatcher to always-deliver.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// The configured window size.
    #[must_use]
    pub fn capacity(&self) -> DdqCapacity {
        self.capacity
    }

    /// Instantiates the store for one dedup key.
    #[must_use]
    pub fn make_store(&self, key: &DdqKey) -> Arc<dyn DdqStore> {
        match &self.storage {
            DdqStorage::Memory => Arc::new(MemoryDdq::new(self.capacity.as_usize())),
            DdqStorage::Redis(options) => Arc::new(RedisDdq::new(
                key,
                self.capacity.as_usize(),
                options.clone(),
            )),
        }
    }
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self::new(false, DdqCapacity::default(), DdqStorage::Memory)
    }
}

/// Point-in-time stats for one DDQ instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DdqStats {
    /// Window size N.
    pub capacity: usize,
    /// Tracked UUID count.
    pub current_count: usize,
    /// Fill ratio as a percentage.
    pub utilization: f64,
    /// Backend identifier.
    pub storage_kind: &'static str,
}

impl DdqStats {
    /// Snapshots a store.
    #[must_use]
    pub fn snapshot(store: &dyn DdqStore) -> Self {
        Self {
            capacity: store.capacity(),
            current_count: store.len(),
            utilization: store.utilization(),
            storage_kind: store.storage_kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_renders_class_colon_handler() {
        let key = DdqKey::new("Order", HandlerId::named("Pay.process"));
        assert_eq!(key.to_string(), "Order:Pay.process");
    }

    #[test]
    fn policy_toggles_at_runtime() {
        let policy = DedupPolicy::default();
        assert!(!policy.is_enabled());
        policy.enable();
        assert!(policy.is_enabled());
        policy.disable();
        assert!(!policy.is_enabled());
    }

    #[test]
    fn memory_policy_builds_memory_stores() {
        let policy = DedupPolicy::new(true, DdqCapacity::try_new(3).unwrap(), DdqStorage::Memory);
        let store = policy.make_store(&DdqKey::new("Order", HandlerId::named("A.b")));
        assert_eq!(store.capacity(), 3);
        assert_eq!(store.storage_kind(), "memory");
    }
}
