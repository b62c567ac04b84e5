//! Subscription registry and handler registry
//!
//! The subscription registry maps a message class name to an ordered list of
//! `{handler id, filter}` entries; ordering is preserved for observability
//! only, dispatch is concurrent. Handler callables live in a separate
//! registry owned by the dispatcher so `unsubscribe` can evict them.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::Filter;
use crate::header::Header;
use crate::message::Message;
use crate::schema::Properties;

/// Identifier binding a subscription to its callable.
///
/// `"Class.method"` for named registrations, `"Class.proc_<hex>"` synthetic
/// for inline closures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(String);

impl HandlerId {
    /// A caller-chosen id, conventionally `"Class.method"`.
    #[must_use]
    pub fn named(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A synthetic id for an inline handler on the given class.
    #[must_use]
    pub(crate) fn inline(class_name: &str) -> Self {
        let tag = Uuid::new_v4().simple().to_string();
        Self(format!("{class_name}.proc_{}", &tag[..8]))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerId {
    fn from(value: &str) -> Self {
        Self::named(value)
    }
}

/// A subscription callable. Both registration styles resolve to one internal
/// invocation; handlers are blocking and run on the worker pool.
#[derive(Clone)]
pub enum Handler {
    /// Receives the whole decoded message.
    Unified(Arc<dyn Fn(&Message) -> anyhow::Result<()> + Send + Sync>),
    /// Receives header and properties separately.
    Split(Arc<dyn Fn(&Header, &Properties) -> anyhow::Result<()> + Send + Sync>),
}

impl Handler {
    /// Wraps a unified-style callable.
    pub fn unified(f: impl Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Self::Unified(Arc::new(f))
    }

    /// Wraps a split-style callable.
    pub fn split(
        f: impl Fn(&Header, &Properties) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::Split(Arc::new(f))
    }

    pub(crate) fn call(&self, message: &Message) -> anyhow::Result<()> {
        match self {
            Self::Unified(f) => f(message),
            Self::Split(f) => f(message.header(), message.properties()),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unified(_) => f.write_str("Handler::Unified(..)"),
            Self::Split(_) => f.write_str("Handler::Split(..)"),
        }
    }
}

/// One registry entry; immutable after creation.
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    /// The callable this subscription delivers to.
    pub handler_id: HandlerId,
    /// Normalized criteria restricting which headers match.
    pub filter: Filter,
}

/// Thread-safe subscription registry keyed by message class name.
///
/// Duplicate `(class, handler id)` entries are allowed and each is invoked
/// independently, permitting multiple distinct filters against one handler.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: DashMap<String, Vec<SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscription for the class.
    pub fn add(&self, class_name: &str, handler_id: HandlerId, filter: Filter) {
        tracing::debug!(class = class_name, handler = %handler_id, "subscription added");
        self.entries
            .entry(class_name.to_string())
            .or_default()
            .push(SubscriptionEntry { handler_id, filter });
    }

    /// Removes every entry whose handler id matches; no-op when absent.
    pub fn remove(&self, class_name: &str, handler_id: &HandlerId) {
        if let Some(mut entries) = self.entries.get_mut(class_name) {
            let before = entries.len();
            entries.retain(|entry| &entry.handler_id != handler_id);
            if entries.len() != before {
                tracing::debug!(class = class_name, handler = %handler_id, "subscription removed");
            }
        }
    }

    /// Removes every entry for the class, returning the evicted handler ids.
    pub fn remove_all(&self, class_name: &str) -> Vec<HandlerId> {
        match self.entries.remove(class_name) {
            Some((_, entries)) => {
                tracing::debug!(class = class_name, count = entries.len(), "class unsubscribed");
                entries.into_iter().map(|e| e.handler_id).collect()
            }
            None => Vec::new(),
        }
    }

    /// Wipes the registry. Test aid.
    pub fn drop_all(&self) {
        self.entries.clear();
    }

    /// Snapshot of the class's entries, safe to iterate without a lock.
    #[must_use]
    pub fn entries_for(&self, class_name: &str) -> Vec<SubscriptionEntry> {
        self.entries
            .get(class_name)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    /// Total entry count across all classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    /// Whether no subscriptions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe mapping of handler id to callable, owned by the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct HandlerRegistry {
    handlers: DashMap<HandlerId, Handler>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: HandlerId, handler: Handler) {
        self.handlers.insert(id, handler);
    }

    pub(crate) fn remove(&self, id: &HandlerId) {
        self.handlers.remove(id);
    }

    pub(crate) fn get(&self, id: &HandlerId) -> Option<Handler> {
        self.handlers.get(id).map(|h| h.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}
